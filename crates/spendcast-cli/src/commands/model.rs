//! Model lifecycle command implementations (bootstrap, status)

use anyhow::Result;
use spendcast_core::ModelInfo;

use super::Env;

pub fn cmd_bootstrap(env: &Env, force: bool) -> Result<()> {
    let existing = spendcast_core::store::load(&env.model_dir, &env.config).ok();

    match existing {
        Some(context) if !force => {
            println!(
                "✓ Model generation {} already usable in {}",
                context.generation,
                env.model_dir.display()
            );
            println!("   Use --force to replace it with a freshly bootstrapped model");
            return Ok(());
        }
        Some(_) => {
            println!("🌱 Replacing the live model with a bootstrapped one...");
            let store = env.open_store()?;
            let context = store.rebootstrap()?;
            println!("✅ Bootstrapped model generation {}", context.generation);
        }
        None => {
            println!("🌱 Bootstrapping a model from synthetic history...");
            // Opening a store without a usable model bootstraps one
            let store = env.open_store()?;
            println!("✅ Bootstrapped model generation {}", store.context().generation);
        }
    }
    Ok(())
}

pub fn cmd_status(env: &Env) -> Result<()> {
    let store = env.open_store()?;
    print!("{}", render_status(&store.context().info(), env));
    Ok(())
}

/// Human-readable model summary
pub fn render_status(info: &ModelInfo, env: &Env) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str("📊 Spendcast Status\n");
    out.push_str("   ─────────────────────────────────────────────\n");
    out.push_str(&format!("   Model dir: {}\n", env.model_dir.display()));
    out.push_str(&format!("   Generation: {}\n", info.generation));
    out.push_str(&format!(
        "   Created: {}\n",
        info.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "   Network: GRU, window {}, hidden {}\n",
        info.window, info.hidden_size
    ));
    out.push_str(&format!("   Categories: {}\n", info.vocabulary.join(", ")));

    match (&info.history_start, &info.history_end) {
        (Some(start), Some(end)) => out.push_str(&format!(
            "   History: {} months ({} to {})\n",
            info.months_of_history, start, end
        )),
        _ => out.push_str("   History: (empty)\n"),
    }
    if let Some(until) = &info.synthetic_until {
        out.push_str(&format!("   Synthetic through: {}\n", until));
    }

    let training = &info.training;
    out.push_str(&format!(
        "   Training: {} epochs, train loss {:.6}",
        training.epochs_run, training.train_loss
    ));
    if let Some(loss) = training.validation_loss {
        out.push_str(&format!(", validation loss {:.6}", loss));
    }
    out.push('\n');
    out
}
