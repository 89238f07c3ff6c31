use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dealflow_agent::{selector, Coordinator, OpenAiToolSelector};
use dealflow_core::config::{
    AppConfig, ConfigOverrides, EmailProviderKind, LoadOptions, LogFormat,
};
use dealflow_crm::CrmService;
use dealflow_notify::{EmailNotifier, EmailProvider};
use dealflow_transport::HttpTransport;

#[derive(Debug, Parser)]
#[command(
    name = "dealflow",
    about = "Natural-language CRM automation",
    long_about = "Translate natural-language requests into typed CRM operations, run them \
                  against the remote CRM, and send a confirmation notification.",
    after_help = "Examples:\n  dealflow run \"create a contact for ada@example.com\"\n  dealflow config"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to dealflow.toml")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the configured log level")]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(about = "Run one natural-language request as a plan of CRM operations")]
    Run {
        #[arg(help = "The request; prompted for interactively when omitted")]
        request: Option<String>,
    },
    #[command(about = "Inspect effective configuration values with secrets redacted")]
    Config,
}

pub async fn execute(cli: Cli) -> Result<()> {
    let config = AppConfig::load(LoadOptions {
        config_path: cli.config,
        overrides: ConfigOverrides { log_level: cli.log_level, ..ConfigOverrides::default() },
        ..LoadOptions::default()
    })?;
    init_logging(&config);

    match cli.command {
        Command::Run { request } => run_request(config, request).await,
        Command::Config => {
            println!("{}", render_config(&config));
            Ok(())
        }
    }
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        LogFormat::Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

async fn run_request(config: AppConfig, request: Option<String>) -> Result<()> {
    let request = match request {
        Some(text) => text,
        None => prompt_for_request()?,
    };

    let crm_transport = HttpTransport::new(&config.crm.base_url)
        .with_bearer_token(&config.crm.access_token)
        .with_timeout(Duration::from_secs(config.crm.timeout_secs));
    let crm = CrmService::new(crm_transport);

    let email_provider = match config.email.provider {
        EmailProviderKind::Resend => EmailProvider::Resend,
        EmailProviderKind::Sendgrid => EmailProvider::SendGrid,
    };
    let email_base_url = config
        .email
        .base_url
        .clone()
        .unwrap_or_else(|| email_provider.default_base_url().to_string());
    let email_transport =
        HttpTransport::new(email_base_url).with_bearer_token(&config.email.api_key);
    let mut notifier = EmailNotifier::new(email_provider, &config.email.from_email, email_transport);
    if let Some(recipient) = &config.email.default_recipient {
        notifier = notifier.with_default_recipient(recipient);
    }

    let llm_base_url =
        config.llm.base_url.clone().unwrap_or_else(|| selector::DEFAULT_BASE_URL.to_string());
    let llm_transport = HttpTransport::new(llm_base_url)
        .with_bearer_token(&config.llm.api_key)
        .with_timeout(Duration::from_secs(config.llm.timeout_secs));
    let tool_selector = OpenAiToolSelector::new(llm_transport, &config.llm.model);

    let coordinator = Coordinator::new(tool_selector, crm, notifier);
    let report = coordinator.run(&request).await?;
    println!("{}", report.render());

    Ok(())
}

fn prompt_for_request() -> Result<String> {
    print!("Enter your CRM request: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let line = line.trim().to_string();
    anyhow::ensure!(!line.is_empty(), "no request provided");
    Ok(line)
}

fn render_config(config: &AppConfig) -> String {
    let format = match config.logging.format {
        LogFormat::Compact => "compact",
        LogFormat::Pretty => "pretty",
        LogFormat::Json => "json",
    };
    let provider = match config.email.provider {
        EmailProviderKind::Resend => "resend",
        EmailProviderKind::Sendgrid => "sendgrid",
    };

    [
        format!("crm.base_url = {}", config.crm.base_url),
        "crm.access_token = [redacted]".to_string(),
        format!("crm.timeout_secs = {}", config.crm.timeout_secs),
        format!("email.provider = {provider}"),
        "email.api_key = [redacted]".to_string(),
        format!("email.from_email = {}", config.email.from_email),
        format!(
            "email.default_recipient = {}",
            config.email.default_recipient.as_deref().unwrap_or("(none)")
        ),
        "llm.api_key = [redacted]".to_string(),
        format!(
            "llm.base_url = {}",
            config.llm.base_url.as_deref().unwrap_or(selector::DEFAULT_BASE_URL)
        ),
        format!("llm.model = {}", config.llm.model),
        format!("logging.level = {}", config.logging.level),
        format!("logging.format = {format}"),
    ]
    .join("\n")
}
