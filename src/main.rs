use anyhow::Context;
use clap::Parser;
use funding_watch::adapters::webdriver::WebDriverLauncher;
use funding_watch::app::commands::WatchCommands;
use funding_watch::config::{
    ChannelCommand, CliConfig, Command, ProjectCommand, TenantCommand, ThresholdCommand, DEFAULT_CONFIG_PATH,
};
use funding_watch::core::fetch::ProjectFetcher;
use funding_watch::core::reader::PageReader;
use funding_watch::core::retry::RetryingStore;
use funding_watch::core::session::SessionManager;
use funding_watch::domain::alert::format_price;
use funding_watch::domain::model::TenantId;
use funding_watch::utils::error::{ErrorSeverity, MonitorError};
use funding_watch::utils::monitor::SystemMonitor;
use funding_watch::utils::{logger, validation::Validate};
use funding_watch::{JsonStateStore, LocalStorage, Monitor, WatchConfig, WebhookNotifier};
use std::path::Path;
use std::sync::Arc;

type Store = RetryingStore<JsonStateStore<LocalStorage>>;

struct Services {
    fetcher: Arc<ProjectFetcher<WebDriverLauncher>>,
    store: Arc<Store>,
    notifier: Arc<WebhookNotifier>,
}

impl Services {
    fn build(config: &WatchConfig) -> funding_watch::Result<Self> {
        let launcher = WebDriverLauncher::new(config.driver_settings())?;
        let sessions = Arc::new(SessionManager::new(launcher));
        let fetcher = Arc::new(ProjectFetcher::new(sessions, PageReader::new(config.reader_settings())));

        let storage = LocalStorage::new(&config.store.path);
        let store = Arc::new(RetryingStore::new(JsonStateStore::new(storage), config.retry_policy()));
        let notifier = Arc::new(WebhookNotifier::new(config.notify_timeout())?);

        Ok(Self {
            fetcher,
            store,
            notifier,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("🚀 Starting funding-watch");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 載入並驗證配置
    let config = match load_config(&cli.config).and_then(|config| config.validate().map(|_| config)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration failed: {}", e);
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(exit_code(e.severity()));
        }
    };
    tracing::info!("✅ Configuration loaded and validated successfully");

    let services = Services::build(&config).context("failed to set up browser and HTTP clients")?;

    if let Err(e) = execute(cli.command, &config, &services).await {
        tracing::error!("❌ Command failed: {} (Severity: {:?})", e, e.severity());
        eprintln!("❌ {}", e.user_friendly_message());

        // 根據錯誤嚴重程度決定退出碼
        let code = exit_code(e.severity());
        if code > 0 {
            services.fetcher.sessions().shutdown().await;
            std::process::exit(code);
        }
    }

    services.fetcher.sessions().shutdown().await;
    Ok(())
}

/// 預設路徑的設定檔不存在時使用預設值
fn load_config(path: &Path) -> funding_watch::Result<WatchConfig> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        tracing::info!("📁 {} not found, using default configuration", DEFAULT_CONFIG_PATH);
        return Ok(WatchConfig::default());
    }
    tracing::info!("📁 Loading configuration from: {}", path.display());
    WatchConfig::from_file(path)
}

fn exit_code(severity: ErrorSeverity) -> i32 {
    match severity {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

async fn execute(command: Command, config: &WatchConfig, services: &Services) -> Result<(), MonitorError> {
    if let Command::Run = command {
        run_monitor(config, services).await;
        return Ok(());
    }

    let commands = WatchCommands::new(
        Arc::clone(&services.fetcher),
        Arc::clone(&services.store),
        Arc::clone(&services.notifier),
        config.monitor_settings().engine,
        config.page.allowed_url_prefix.clone(),
    );

    match command {
        Command::Run => {}
        Command::Tenant { tenant, action } => match action {
            TenantCommand::Init => {
                let tenant = TenantId::new(tenant);
                if commands.ensure_tenant(&tenant).await? {
                    println!("✅ Tenant {} created", tenant);
                } else {
                    println!("Tenant {} already exists", tenant);
                }
            }
        },
        Command::Project { tenant, action } => {
            let tenant = TenantId::new(tenant);
            match action {
                ProjectCommand::Add { url } => {
                    let summary = commands.add_project(&tenant, &url).await?;
                    println!("✅ Watching {} ({})", summary.title, summary.url);
                    println!("   Current funding: {}", format_price(summary.funding));
                    if let Some(image) = summary.image_url {
                        println!("   Image: {}", image);
                    }
                }
                ProjectCommand::Stop { title } => {
                    let project = commands.stop_project(&tenant, &title).await?;
                    println!("🛑 Stopped watching {}", project.title);
                }
                ProjectCommand::List => {
                    let statuses = commands.list_projects(&tenant).await?;
                    if statuses.is_empty() {
                        println!("No projects are being watched.");
                    }
                    for status in statuses {
                        match (status.current_funding, status.error) {
                            (_, Some(error)) => println!("❌ {} - {} ({})", status.title, status.url, error),
                            (Some(funding), None) => {
                                println!("📌 {} - {} ({})", status.title, format_price(funding), status.url)
                            }
                            (None, None) => println!("📌 {} - funding unavailable ({})", status.title, status.url),
                        }
                    }
                }
                ProjectCommand::Search { needle } => {
                    for title in commands.matching_titles(&tenant, &needle).await? {
                        println!("{}", title);
                    }
                }
            }
        }
        Command::Threshold { tenant, action } => {
            let tenant = TenantId::new(tenant);
            match action {
                ThresholdCommand::Add { title, amount } => {
                    commands.add_threshold(&tenant, &title, amount).await?;
                    println!("🎯 Threshold {} set for {}", format_price(amount), title);
                }
                ThresholdCommand::Clear { title } => {
                    commands.clear_thresholds(&tenant, &title).await?;
                    println!("Thresholds cleared for {}", title);
                }
                ThresholdCommand::List { title } => {
                    let thresholds = commands.list_thresholds(&tenant, &title).await?;
                    if thresholds.is_empty() {
                        println!("No thresholds set for {}", title);
                    }
                    for threshold in thresholds {
                        println!("- {}", format_price(threshold));
                    }
                }
            }
        }
        Command::Channel { tenant, action } => {
            let tenant = TenantId::new(tenant);
            match action {
                ChannelCommand::Add { url } => {
                    commands.add_destination(&tenant, &url).await?;
                    println!("✅ Alerts will be sent to {}", url);
                }
                ChannelCommand::Remove { url } => {
                    commands.remove_destination(&tenant, &url).await?;
                    println!("Alerts will no longer be sent to {}", url);
                }
            }
        }
        Command::TestFunding { tenant, title, amount } => {
            let simulation = commands
                .test_funding(&TenantId::new(tenant), &title, amount)
                .await?;
            if simulation.evaluation.events.is_empty() {
                println!("No alerts would fire at {}", format_price(amount));
            }
            for event in &simulation.evaluation.events {
                println!("🔔 {:?}", event);
            }
        }
    }

    Ok(())
}

async fn run_monitor(config: &WatchConfig, services: &Services) {
    let system = Arc::new(SystemMonitor::new());
    system.log_stats("Startup");

    let watchdog = services.fetcher.sessions().spawn_watchdog(
        Arc::clone(&system),
        config.watchdog_interval(),
        config.memory_limit_bytes(),
    );

    let monitor = Monitor::new(
        Arc::clone(&services.fetcher),
        Arc::clone(&services.store),
        Arc::clone(&services.notifier),
        config.monitor_settings(),
    );

    monitor
        .run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("🛑 Shutdown requested"),
                Err(e) => {
                    tracing::error!("Could not listen for Ctrl-C, running until killed: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await;

    watchdog.abort();
    system.log_stats("Shutdown");
}
