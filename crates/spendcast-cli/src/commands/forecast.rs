//! Forecast and retrain command implementations

use std::path::Path;

use anyhow::{Context, Result};
use spendcast_core::{read_transactions_file, ForecastResult};

use super::Env;

pub fn cmd_forecast(env: &Env, file: &Path, year: i32, month: u32, json: bool) -> Result<()> {
    let transactions = read_transactions_file(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let store = env.open_store()?;
    let result = store.forecast(&transactions, year, month)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_forecast(&result, transactions.len()));
    }
    Ok(())
}

/// Human-readable forecast table
pub fn render_forecast(result: &ForecastResult, transaction_count: usize) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!(
        "🔮 Forecast for {}-{:02} ({} transactions, {})\n",
        result.target_year, result.target_month, transaction_count, result.method
    ));
    if result.is_clamped() {
        out.push_str(&format!(
            "   ⚠️  Amounts describe {} (nearest month the model can reach)\n",
            result.predicted()
        ));
    }
    out.push_str("   ─────────────────────────────────────────────\n");
    for p in &result.predictions {
        out.push_str(&format!(
            "   {:<16} {:>12.2}   (confidence {:.1})\n",
            p.category, p.predicted_amount, p.confidence
        ));
    }
    out.push_str("   ─────────────────────────────────────────────\n");
    out.push_str(&format!("   {:<16} {:>12.2}\n", "Total", result.total()));
    out
}

pub fn cmd_retrain(env: &Env, file: &Path) -> Result<()> {
    let transactions = read_transactions_file(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    if transactions.is_empty() {
        anyhow::bail!("{} contains no transactions", file.display());
    }

    let store = env.open_store()?;
    let previous = store.context().generation;
    println!(
        "🧠 Retraining on {} new transactions (current generation {})...",
        transactions.len(),
        previous
    );

    let report = store.retrain(&transactions)?;

    println!("✅ Model generation {} is live", report.generation);
    println!("   Months of history: {}", report.months_used);
    println!(
        "   Epochs: {} (best {}{})",
        report.training.epochs_run,
        report.training.best_epoch,
        if report.training.stopped_early {
            ", stopped early"
        } else {
            ""
        }
    );
    println!("   Train loss: {:.6}", report.training.train_loss);
    if let Some(loss) = report.training.validation_loss {
        println!("   Validation loss: {:.6}", loss);
    }
    Ok(())
}
