use super::{short_id, Context};
use anyhow::Result;
use chicken_core::{AccountId, Amount};
use chicken_pool::{run_keeper, KeeperConfig, PoolEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub async fn place_bet(ctx: &Context, pool: &str, bettor: &str, amount: Option<u64>) -> Result<()> {
    let pool = ctx.pool(pool).await?;
    let bettor = AccountId::new(bettor);
    let amount = match amount {
        Some(units) => Amount::from_units(units),
        None => pool.info().await?.bet_size,
    };

    let event = pool.place_bet(&bettor, amount).await?;

    println!("Bet placed!");
    println!("Bettor: {}", event.bettor);
    println!("Amount: {} units", event.amount);
    println!("Round: {}", event.round);
    println!("Pool Balance: {} units", event.pool_balance);
    println!(
        "Time: {}",
        event.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
    println!("{} wins unless someone bets within the interval.", event.bettor);

    Ok(())
}

pub async fn settle(ctx: &Context, pool: &str, settler: &str) -> Result<()> {
    let event = ctx
        .pool(pool)
        .await?
        .settle_round(&AccountId::new(settler))
        .await?;

    println!("Round {} settled!", event.round);
    println!("Winner: {} ({} units)", event.winner, event.amount);
    println!("Rake: {} units", event.rake);
    println!("Settle Reward: {} units to {}", event.reward, event.settler);

    Ok(())
}

/// Runs a keeper against the pool until Ctrl-C. Every tick reads the latest
/// stored state, so bets placed from other processes are seen.
pub async fn watch(ctx: &Context, pool: &str, settler: &str, poll_secs: u64) -> Result<()> {
    let pool = Arc::new(ctx.pool(pool).await?);
    let mut events = pool.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let config = KeeperConfig::new(AccountId::new(settler))
        .with_poll_every(Duration::from_secs(poll_secs.max(1)));
    let keeper = tokio::spawn(run_keeper(pool.clone(), config, shutdown_rx));

    println!(
        "Watching pool {} (settler {}). Press Ctrl-C to stop.",
        short_id(&pool.id().to_string()),
        settler
    );

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(PoolEvent::RoundSettled(settled)) => {
                        println!(
                            "Round {} settled: {} wins {} units",
                            settled.round, settled.winner, settled.amount
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Missed pool events: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    // receiver is still held by the keeper task
    let _ = shutdown_tx.send(true);
    let settled = keeper.await?;
    println!("Stopped after settling {} round(s).", settled);

    Ok(())
}
