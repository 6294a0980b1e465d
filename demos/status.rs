use heos::{ClientConfig, DeviceAddress, DiscoveryConfig, HeosClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("heos=info")),
        )
        .init();

    // Use the host given on the command line or in HEOS_HOST, otherwise search
    let host = std::env::args().nth(1).or_else(|| std::env::var("HEOS_HOST").ok());
    let mut client = match host {
        Some(host) => {
            HeosClient::connect_with_config(&DeviceAddress::new(host), ClientConfig::default())
                .await?
        }
        None => {
            println!("Searching for a HEOS device...");
            HeosClient::discover(&DiscoveryConfig::default(), ClientConfig::default()).await?
        }
    };

    let players = client.get_players().await?;
    if players.is_empty() {
        println!("No players found");
        client.close().await;
        return Ok(());
    }

    for player in &players {
        println!("{:>12}  {} ({})", player.pid, player.name, player.model);
    }

    let volume = client.get_volume(None).await?;
    let muted = client.get_mute(None).await?;
    let state = client.get_play_state(None).await?;
    println!();
    println!("Player:  {}", players[0].name);
    println!("Volume:  {}{}", volume, if muted { " (muted)" } else { "" });
    println!("State:   {}", state);

    match client.get_now_playing_media(None).await {
        Ok(media) if !media.song.is_empty() => {
            println!("Playing: {} - {}", media.artist, media.song)
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Could not read now playing media: {}", e),
    }

    client.close().await;
    Ok(())
}
