use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Parser)]
#[command(name = "fleetctl")]
#[command(about = "Send one command to a fleetd control listener", long_about = None)]
struct Cli {
    /// Control listener address.
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    addr: String,

    /// Command keyword followed by its parameters, e.g. `add-host net1 h1 10.0.0.5 aa:bb:cc:dd:ee:ff h1`.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut stream = TcpStream::connect(&cli.addr).await?;
    stream.write_all(cli.command.join(" ").as_bytes()).await?;
    stream.shutdown().await?;

    let mut response = String::new();
    stream.read_to_string(&mut response).await?;

    match serde_json::from_str::<serde_json::Value>(&response) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", response),
    }
    Ok(())
}
