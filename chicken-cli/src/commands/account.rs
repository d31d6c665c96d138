use super::Context;
use anyhow::Result;
use chicken_core::{AccountId, Amount, Ledger};
use comfy_table::{presets::UTF8_FULL, Table};

pub async fn fund(ctx: &Context, account: &str, amount: u64) -> Result<()> {
    let account = AccountId::new(account);
    let balance = ctx
        .ledger()
        .credit(&account, Amount::from_units(amount))
        .await?;

    println!("Credited {} units to {}", amount, account);
    println!("New balance: {} units", balance);

    Ok(())
}

pub async fn show_balance(ctx: &Context, account: Option<&str>) -> Result<()> {
    if let Some(account) = account {
        let account = AccountId::new(account);
        let balance = ctx.ledger().balance_of(&account).await?;
        println!("{}: {} units", account, balance);
        return Ok(());
    }

    let accounts = ctx.ledger().list_accounts().await?;
    if accounts.is_empty() {
        println!("No funded accounts.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Account", "Balance"]);
    for (account, balance) in &accounts {
        table.add_row(vec![account.to_string(), format!("{} units", balance)]);
    }

    println!("{}", table);
    Ok(())
}
