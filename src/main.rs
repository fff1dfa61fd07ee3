use std::sync::Arc;

use chatpilot::bot::Bot;
use chatpilot::config::{BotConfig, PersonaSet, ProviderConfig};
use chatpilot::context::BotContext;
use chatpilot::llm::create_provider;
use chatpilot::plugins::{AdminPlugin, OwnerPlugin, Plugin, PluginRegistry, ResponderPlugin};
use chatpilot::pool::CompletionPool;
use chatpilot::surface::{AutomationSurface, CliSurface};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env();

    let Some(provider_config) = ProviderConfig::from_env() else {
        eprintln!("Error: CHATPILOT_API_KEY not set");
        eprintln!("  export CHATPILOT_API_KEY=sk-...");
        eprintln!("  export CHATPILOT_API_URL=https://api.openai.com/v1   # optional");
        eprintln!("  export CHATPILOT_MODEL=gpt-4o-mini                   # optional");
        std::process::exit(1);
    };

    let user =
        std::env::var("CHATPILOT_LOCAL_USER").unwrap_or_else(|_| "local-user".to_string());
    let owners: Vec<String> = std::env::var("CHATPILOT_OWNER")
        .unwrap_or_else(|_| user.clone())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let mut commanders: Vec<String> = std::env::var("CHATPILOT_COMMANDERS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    for owner in &owners {
        if !commanders.contains(owner) {
            commanders.push(owner.clone());
        }
    }

    eprintln!("🤖 chatpilot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", provider_config.model);
    eprintln!("   Bot name: {}", config.self_name);
    eprintln!("   Owner(s): {}", owners.join(", "));
    eprintln!("   Type a message and press Enter. !stop (as owner) to exit.\n");

    let ctx = Arc::new(BotContext::new(
        config.self_name.clone(),
        owners,
        commanders,
    ));

    // CLI surface for local runs; a real deployment swaps in the
    // UI-automation surface here.
    let surface: Arc<dyn AutomationSurface> =
        Arc::new(CliSurface::start(user, config.self_name.clone()));

    let provider = create_provider(&provider_config)?;
    let pool = Arc::new(CompletionPool::new(provider, config.history_len));

    let plugins: Vec<Arc<dyn Plugin>> = vec![
        OwnerPlugin::new(Arc::clone(&surface), Arc::clone(&ctx)),
        AdminPlugin::new(Arc::clone(&surface), Arc::clone(&ctx)),
        ResponderPlugin::new(
            Arc::clone(&surface),
            Arc::clone(&pool),
            PersonaSet::builtin(),
            config.self_name.clone(),
            config.collect_timeout,
        ),
    ];

    let registry = PluginRegistry::load(plugins, &config.disabled_plugins).await?;
    eprintln!("   Plugins: {} loaded\n", registry.len());

    let bot = Bot::new(config, ctx, surface, registry);
    bot.run().await?;

    Ok(())
}
