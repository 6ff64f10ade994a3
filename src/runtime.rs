//! Wall-clock driver for a [`Cartogram`]
//!
//! Maps the controller's virtual clock onto `tokio::time`: the driver sleeps
//! until the next due event and applies commands as they arrive in between.
//! Everything runs on the calling task, so ticks and commands never overlap.

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::cartogram::Cartogram;
use crate::config::{DorlingConfig, NutsLevel};

/// External controls for a running cartogram
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Toggle,
    Restart,
    /// Rebuild with a new configuration
    Rebuild(Box<DorlingConfig>),
    /// Rebuild at another geographic level
    SetLevel(NutsLevel),
    Hover(String),
    Unhover(String),
    /// Stop driving and hand the cartogram back
    Shutdown,
}

impl Command {
    /// Parse a one-letter console command: `p` toggle, `r` restart, `0`..`3`
    /// level, `q` quit
    pub fn from_console(line: &str) -> Option<Self> {
        match line.trim() {
            "p" => Some(Command::Toggle),
            "r" => Some(Command::Restart),
            "q" => Some(Command::Shutdown),
            other => other
                .parse::<u8>()
                .ok()
                .and_then(|n| NutsLevel::try_from(n).ok())
                .map(Command::SetLevel),
        }
    }
}

/// Drive `cartogram` until a [`Command::Shutdown`] arrives or every sender is
/// dropped, then return it.
///
/// The cartogram should already be started. A failed rebuild is logged and
/// leaves the running cartogram as it was.
pub async fn drive(mut cartogram: Cartogram, mut commands: mpsc::Receiver<Command>) -> Cartogram {
    let origin = Instant::now();
    let base = cartogram.now();
    let virtual_now = || base + origin.elapsed();

    loop {
        let deadline = cartogram
            .next_due()
            .map(|due| origin + due.saturating_sub(base));
        let sleep = async {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            command = commands.recv() => {
                cartogram.advance_to(virtual_now());
                match command {
                    Some(Command::Shutdown) => {
                        info!("shutdown requested");
                        break;
                    }
                    Some(command) => apply(&mut cartogram, command),
                    None => {
                        debug!("command channel closed");
                        break;
                    }
                }
            }
            () = sleep => {
                cartogram.advance_to(virtual_now());
            }
        }
    }

    cartogram
}

fn apply(cartogram: &mut Cartogram, command: Command) {
    debug!(?command, "applying command");
    match command {
        Command::Play => cartogram.play(),
        Command::Pause => cartogram.pause(),
        Command::Toggle => {
            cartogram.toggle();
        }
        Command::Restart => cartogram.restart(),
        Command::Rebuild(config) => {
            if let Err(err) = cartogram.rebuild(*config) {
                warn!(%err, "rebuild rejected");
            }
        }
        Command::SetLevel(level) => {
            if let Err(err) = cartogram.set_level(level) {
                warn!(%err, %level, "level change rejected");
            }
        }
        Command::Hover(id) => {
            if let Some(info) = cartogram.hover(&id) {
                info!(
                    id = %info.id,
                    country = info.country.unwrap_or("?"),
                    value = ?info.size_value,
                    share = ?info.share_percent,
                    "hover"
                );
            }
        }
        Command::Unhover(id) => {
            cartogram.unhover(&id);
        }
        Command::Shutdown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::Phase;
    use crate::io::{Centroid, StaticGeometry, StaticStatistics, Statistics};
    use std::time::Duration;
    use tokio::time::sleep;

    fn cartogram() -> Cartogram {
        let centroids = vec![
            Centroid::new("BE10", 0.0, 0.0),
            Centroid::new("BE21", 3.0, 1.0),
        ];
        let stats = Statistics {
            size: [("BE10", 100.0), ("BE21", 100.0)]
                .into_iter()
                .map(|(id, v)| (id.to_string(), Some(v)))
                .collect(),
            color: Default::default(),
        };
        let mut cartogram = Cartogram::new(
            DorlingConfig::default().with_radius_scale(1.0),
            Box::new(StaticGeometry::new().with_level(NutsLevel::Nuts2, centroids)),
            Box::new(StaticStatistics::new().with_level(NutsLevel::Nuts2, stats)),
        );
        cartogram.start().unwrap();
        cartogram
    }

    #[test]
    fn console_commands() {
        assert_eq!(Command::from_console("p\n"), Some(Command::Toggle));
        assert_eq!(Command::from_console("q"), Some(Command::Shutdown));
        assert_eq!(
            Command::from_console("0"),
            Some(Command::SetLevel(NutsLevel::Country))
        );
        assert_eq!(Command::from_console("7"), None);
        assert_eq!(Command::from_console("x"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn dwell_fires_on_the_wall_clock() {
        let (tx, rx) = mpsc::channel(8);
        let (cartogram, ()) = tokio::join!(drive(cartogram(), rx), async move {
            sleep(Duration::from_millis(2100)).await;
            tx.send(Command::Shutdown).await.unwrap();
        });

        assert_eq!(cartogram.phase(), Phase::Cartogram);
        assert!(cartogram.active_run().is_some());
        assert!(cartogram.now() >= Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_before_dwell_holds_map() {
        let (tx, rx) = mpsc::channel(8);
        let (cartogram, ()) = tokio::join!(drive(cartogram(), rx), async move {
            tx.send(Command::Pause).await.unwrap();
            sleep(Duration::from_secs(10)).await;
        });

        assert_eq!(cartogram.phase(), Phase::Map);
        assert!(!cartogram.is_playing());
        assert!(cartogram.now() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_level_change_keeps_running() {
        let (tx, rx) = mpsc::channel(8);
        let (cartogram, ()) = tokio::join!(drive(cartogram(), rx), async move {
            tx.send(Command::SetLevel(NutsLevel::Nuts3)).await.unwrap();
            sleep(Duration::from_millis(100)).await;
        });

        assert_eq!(cartogram.generation().0, 1);
        assert_eq!(cartogram.config().nuts_level, NutsLevel::Nuts2);
    }
}
