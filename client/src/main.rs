use clap::Parser;
use client::network::{Client, ClientOptions};
use log::info;
use shared::{Color, Encoding};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Websocket URL of the server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080/ws")]
    server: String,

    /// Room code to join after connecting
    #[arg(short = 'r', long)]
    room: Option<String>,

    /// Seat color to claim in the room
    #[arg(short = 'c', long)]
    color: Option<Color>,

    /// Roll and move automatically whenever it is this client's turn
    #[arg(short = 'a', long)]
    autoplay: bool,

    /// Use bincode binary frames instead of JSON text frames
    #[arg(short = 'b', long)]
    binary: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let options = ClientOptions {
        server: args.server,
        room: args.room,
        color: args.color,
        autoplay: args.autoplay,
        encoding: if args.binary {
            Encoding::Bincode
        } else {
            Encoding::Json
        },
    };

    info!("Starting client...");
    if options.autoplay {
        info!("Autoplay enabled");
    }

    let client = Client::connect(options).await?;
    client.run().await?;

    Ok(())
}
