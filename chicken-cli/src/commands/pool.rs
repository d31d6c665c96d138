use super::{short_id, Context};
use anyhow::Result;
use chicken_core::{AccountId, Amount, PoolConfig, SystemClock};
use chicken_pool::{compute_payout, BettingPool, PoolInfo, RoundPhase};
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Confirm;
use std::time::Duration;

pub struct InitArgs {
    pub owner: String,
    pub vault: String,
    pub bet_size: Option<u64>,
    pub interval_secs: Option<u64>,
    pub rake_bps: Option<u16>,
    pub settle_reward: Option<u64>,
    pub yes: bool,
}

pub async fn init_pool(ctx: &Context, args: InitArgs) -> Result<()> {
    let mut config = PoolConfig::new(AccountId::new(args.owner), AccountId::new(args.vault));
    if let Some(bet_size) = args.bet_size {
        config = config.with_bet_size(Amount::from_units(bet_size));
    }
    if let Some(secs) = args.interval_secs {
        config = config.with_interval(Duration::from_secs(secs));
    }
    if let Some(bps) = args.rake_bps {
        config = config.with_rake_bps(bps);
    }
    if let Some(reward) = args.settle_reward {
        config = config.with_settle_reward(Amount::from_units(reward));
    }

    if config.owner == config.vault && !args.yes {
        let proceed = Confirm::new()
            .with_prompt("Owner and vault are the same account. Continue?")
            .default(false)
            .interact()?;
        if !proceed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let pool = ctx.create_pool(config).await?;
    let info = pool.info().await?;
    println!("Created new pool!");
    println!("Pool ID: {}", info.id);
    println!("Bet Size: {} units", info.bet_size);
    println!("Interval: {}s", info.interval_secs);
    println!("Rake: {} bps", info.rake_bps);
    println!("Settle Reward: {} units", info.settle_reward);
    println!("Custody Account: {}", info.custody);
    println!();
    println!("Place the first bet with:");
    println!("chicken bet {} <bettor>", short_id(&info.id.to_string()));

    Ok(())
}

pub async fn list_pools(ctx: &Context) -> Result<()> {
    let records = ctx.pools().list_pools().await?;

    if records.is_empty() {
        println!("No pools.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Pool ID", "Round", "Phase", "Bets", "Pool", "Bet Size"]);

    for record in records {
        let pool: BettingPool = ctx.pools().load_snapshot(record.id).await?;
        let info = pool.get_info(&SystemClock);
        table.add_row(vec![
            short_id(&info.id.to_string()).to_string(),
            info.round.to_string(),
            phase_label(info.phase).to_string(),
            info.bet_count.to_string(),
            format!("{} units", info.pool_balance),
            format!("{} units", info.bet_size),
        ]);
    }

    println!("Pools:");
    println!("{}", table);

    Ok(())
}

pub async fn show_status(ctx: &Context, pool: &str) -> Result<()> {
    let info = ctx.pool(pool).await?.info().await?;
    print_info(&info);
    Ok(())
}

fn print_info(info: &PoolInfo) {
    println!("Pool Status: {}", info.id);
    println!("═══════════════════════════════════");
    println!("Round: {}", info.round);
    println!("Phase: {}", phase_label(info.phase));
    println!("Pool Balance: {} units ({} bets)", info.pool_balance, info.bet_count);
    println!(
        "Last Bettor: {}",
        info.last_bettor
            .as_ref()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "Last Bet: {}",
        info.last_bet_timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(secs) = info.settleable_in_secs {
        if secs == 0 {
            println!("Settleable: now");
        } else {
            println!("Settleable In: {}s", secs);
        }
    }
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Setting", "Value"]);
    table.add_row(vec!["Bet Size".to_string(), format!("{} units", info.bet_size)]);
    table.add_row(vec!["Interval".to_string(), format!("{}s", info.interval_secs)]);
    table.add_row(vec!["Rake".to_string(), format!("{} bps", info.rake_bps)]);
    table.add_row(vec![
        "Settle Reward".to_string(),
        format!("{} units", info.settle_reward),
    ]);
    table.add_row(vec!["Vault".to_string(), info.vault.to_string()]);
    table.add_row(vec!["Owner".to_string(), info.owner.to_string()]);
    table.add_row(vec!["Custody".to_string(), info.custody.to_string()]);
    println!("{}", table);

    if let Some(winner) = &info.recent_winner {
        println!();
        println!("Last Winner: {} ({} units)", winner, info.recent_win_amount);
    }
}

fn phase_label(phase: RoundPhase) -> &'static str {
    match phase {
        RoundPhase::Empty => "Empty",
        RoundPhase::Open { .. } => "Open",
        RoundPhase::Settleable { .. } => "Settleable",
    }
}

pub async fn show_history(ctx: &Context, pool: &str, limit: usize) -> Result<()> {
    let id = ctx.resolve_pool(pool).await?;
    let events = ctx.events().list(id, limit).await?;

    if events.is_empty() {
        println!("No events for pool {}.", short_id(&id.to_string()));
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Event", "Round", "Account", "Amount", "Time"]);

    for event in &events {
        let payload = &event.payload;
        let account = match event.kind.as_str() {
            "BetPlaced" => payload["bettor"].as_str(),
            _ => payload["winner"].as_str(),
        };
        table.add_row(vec![
            event.seq.to_string(),
            event.kind.clone(),
            payload["round"].to_string(),
            account.unwrap_or("-").to_string(),
            format!("{} units", payload["amount"]),
            event.created_at.format("%H:%M:%S").to_string(),
        ]);
    }

    println!("{}", table);
    Ok(())
}

pub async fn set_rake(ctx: &Context, pool: &str, caller: &str, bps: u16) -> Result<()> {
    ctx.pool(pool)
        .await?
        .set_rake(&AccountId::new(caller), bps)
        .await?;

    println!("Rake set to {} bps", bps);
    Ok(())
}

pub async fn set_reward(ctx: &Context, pool: &str, caller: &str, amount: u64) -> Result<()> {
    let pool = ctx.pool(pool).await?;
    let reward = Amount::from_units(amount);
    pool.set_settle_reward(&AccountId::new(caller), reward)
        .await?;

    let info = pool.info().await?;
    println!("Settle reward set to {} units", reward);
    let covered = info
        .bet_size
        .checked_mul(2)
        .map_or(false, |min| compute_payout(min, info.rake_bps, reward).is_ok());
    if !covered {
        println!("Warning: a two-bet pool cannot cover this reward, small rounds will not settle");
    }
    Ok(())
}

pub async fn transfer_owner(
    ctx: &Context,
    pool: &str,
    caller: &str,
    new_owner: &str,
) -> Result<()> {
    ctx.pool(pool)
        .await?
        .transfer_ownership(&AccountId::new(caller), AccountId::new(new_owner))
        .await?;

    println!("Ownership transferred to {}", new_owner);
    Ok(())
}
