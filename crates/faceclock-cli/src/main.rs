use anyhow::Result;
use clap::{Parser, Subcommand};

#[zbus::proxy(
    interface = "org.freedesktop.Faceclock1",
    default_service = "org.freedesktop.Faceclock1",
    default_path = "/org/freedesktop/Faceclock1"
)]
trait Faceclock {
    async fn signup(&self, username: &str) -> zbus::Result<String>;
    async fn clock_in(&self) -> zbus::Result<String>;
    async fn clock_out(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
    async fn preview(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "faceclock", about = "Attendance kiosk CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the face currently in front of the camera
    Signup {
        /// Username to register the face under
        #[arg(short, long)]
        user: String,
    },
    /// Clock in by face recognition
    In,
    /// Clock out by face recognition
    Out,
    /// Show per-user clock statuses and gallery size
    Status,
    /// Show the latest preview detections
    Preview,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session().await?;
    let proxy = FaceclockProxy::new(&conn).await?;

    let reply = match cli.command {
        Commands::Signup { user } => proxy.signup(&user).await?,
        Commands::In => proxy.clock_in().await?,
        Commands::Out => proxy.clock_out().await?,
        Commands::Status => proxy.status().await?,
        Commands::Preview => proxy.preview().await?,
    };

    // Replies are JSON; pretty-print when possible, pass through otherwise.
    match serde_json::from_str::<serde_json::Value>(&reply) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{reply}"),
    }

    Ok(())
}
