use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vigil_core::audit::{self, AuditReport};
use vigil_core::config::Settings;
use vigil_core::ports::RecordStore;
use vigil_core::rate_limit::MemoryRateLimiter;
use vigil_core::vapid::generate_vapid_credentials;
use vigil_core::webpush::WebPushTransport;
use vigil_core::{
    DeliveryTag, DispatchRequest, DispatchResult, DispatchScope, Dispatcher, PushMessage,
};

#[derive(Debug, Parser)]
#[command(name = "vigil")]
#[command(about = "Push subscription maintenance and alarm dispatch", version)]
struct Args {
    /// Overrides VIGIL_DATABASE_URL.
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report malformed or orphaned subscription records.
    Diagnose {
        #[arg(long)]
        check_owners: bool,
    },
    /// Delete every record the audit flags.
    Clean {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        check_owners: bool,
    },
    /// Send one alarm through the dispatcher.
    SendAlarm {
        #[arg(long, value_enum, default_value_t = ScopeArg::All)]
        scope: ScopeArg,
        #[arg(long = "user-id")]
        user_ids: Vec<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        object_id: Option<String>,
        #[arg(long)]
        object_name: Option<String>,
        /// Mark the push as a test notification.
        #[arg(long)]
        test: bool,
    },
    RemoveSubscription {
        #[arg(long)]
        user_id: String,
    },
    /// Print a fresh VAPID key pair.
    VapidKeys,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScopeArg {
    All,
    Users,
    Role,
}

fn build_scope(
    scope: ScopeArg,
    user_ids: Vec<String>,
    role: Option<String>,
) -> anyhow::Result<DispatchScope> {
    match scope {
        ScopeArg::All => Ok(DispatchScope::All),
        ScopeArg::Users if user_ids.is_empty() => {
            anyhow::bail!("--scope users needs at least one --user-id")
        }
        ScopeArg::Users => Ok(DispatchScope::Users(user_ids)),
        ScopeArg::Role => role
            .map(DispatchScope::Role)
            .context("--scope role needs --role"),
    }
}

fn load_settings(database_url: Option<&str>) -> anyhow::Result<Settings> {
    let settings = Settings::from_lookup(|name| match (name, database_url) {
        ("VIGIL_DATABASE_URL", Some(url)) => Some(url.to_string()),
        _ => std::env::var(name).ok(),
    })?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let args = Args::parse();
    run(args).await
}

async fn run(args: Args) -> anyhow::Result<()> {
    let database_url = args.database_url.as_deref();
    match args.command {
        Command::VapidKeys => {
            let credentials = generate_vapid_credentials()?;
            println!("VIGIL_VAPID_PRIVATE_KEY={}", credentials.private_key);
            println!("VIGIL_VAPID_PUBLIC_KEY={}", credentials.public_key);
            Ok(())
        }
        Command::Diagnose { check_owners } => {
            let settings = load_settings(database_url)?;
            let store = connect(&settings).await?;
            let report = audit::audit(store.as_ref(), check_owners).await?;
            print_report(&report)?;
            Ok(())
        }
        Command::Clean {
            dry_run,
            check_owners,
        } => {
            let settings = load_settings(database_url)?;
            let store = connect(&settings).await?;
            let report = audit::audit(store.as_ref(), check_owners).await?;
            print_report(&report)?;
            if dry_run {
                info!(flagged = report.flagged.len(), "dry run, nothing deleted");
                return Ok(());
            }
            let removed = audit::clean(store.as_ref(), &report).await;
            if removed < report.flagged.len() {
                warn!(
                    removed,
                    flagged = report.flagged.len(),
                    "some flagged records could not be deleted"
                );
            }
            println!("removed {} of {} flagged records", removed, report.flagged.len());
            Ok(())
        }
        Command::SendAlarm {
            scope,
            user_ids,
            role,
            title,
            body,
            object_id,
            object_name,
            test,
        } => {
            let scope = build_scope(scope, user_ids, role)?;
            let settings = load_settings(database_url)?;
            let store = connect(&settings).await?;
            let transport = Arc::new(WebPushTransport::from_settings(&settings)?);
            let dispatcher = Dispatcher::new(
                store,
                transport,
                Arc::new(MemoryRateLimiter::default()),
                settings.dispatch_settings(),
            );

            let mut message = PushMessage::new(if test {
                DeliveryTag::Test
            } else {
                DeliveryTag::Alarm
            });
            message.title = title;
            message.body = body;
            message.object_id = object_id;
            message.object_name = object_name;

            let result = dispatcher
                .dispatch(&DispatchRequest::new(scope, message), Utc::now())
                .await?;
            print_result(&result)?;
            Ok(())
        }
        Command::RemoveSubscription { user_id } => {
            let settings = load_settings(database_url)?;
            let store = connect(&settings).await?;
            let removed = store.delete_by_user(&user_id).await?;
            info!(%user_id, removed, "subscriptions removed");
            println!("removed {} subscription(s) for {}", removed, user_id);
            Ok(())
        }
    }
}

async fn connect(settings: &Settings) -> anyhow::Result<Arc<dyn RecordStore>> {
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to database")?;
    Ok(Arc::new(db::PgRecordStore::new(pool)))
}

fn print_report(report: &AuditReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn print_result(result: &DispatchResult) -> anyhow::Result<()> {
    let errors: Vec<serde_json::Value> = result
        .failures
        .iter()
        .map(|failure| {
            serde_json::json!({
                "subscriptionId": failure.record_id,
                "error": failure.reason.to_string(),
            })
        })
        .collect();
    let summary = serde_json::json!({
        "sentCount": result.success_count,
        "errorCount": result.error_count(),
        "errors": errors,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_clean_flags() {
        let args = Args::try_parse_from(["vigil", "clean", "--dry-run", "--check-owners"]).unwrap();
        match args.command {
            Command::Clean {
                dry_run,
                check_owners,
            } => {
                assert!(dry_run);
                assert!(check_owners);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_send_alarm_defaults_to_all() {
        let args = Args::try_parse_from(["vigil", "send-alarm", "--title", "Fire"]).unwrap();
        match args.command {
            Command::SendAlarm {
                scope, title, test, ..
            } => {
                assert_eq!(scope, ScopeArg::All);
                assert_eq!(title.as_deref(), Some("Fire"));
                assert!(!test);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_send_alarm_repeated_user_ids() {
        let args = Args::try_parse_from([
            "vigil",
            "send-alarm",
            "--scope", "users",
            "--user-id", "u1",
            "--user-id", "u2",
        ])
        .unwrap();
        match args.command {
            Command::SendAlarm {
                scope,
                user_ids,
                role,
                ..
            } => {
                let scope = build_scope(scope, user_ids, role).unwrap();
                assert_eq!(
                    scope,
                    DispatchScope::Users(vec!["u1".to_string(), "u2".to_string()])
                );
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_users_scope_without_ids_fails() {
        assert!(build_scope(ScopeArg::Users, vec![], None).is_err());
        assert!(build_scope(ScopeArg::Role, vec![], None).is_err());
        assert_eq!(
            build_scope(ScopeArg::Role, vec![], Some("admin".to_string())).unwrap(),
            DispatchScope::Role("admin".to_string())
        );
    }

    #[test]
    fn test_remove_subscription_requires_user() {
        assert!(Args::try_parse_from(["vigil", "remove-subscription"]).is_err());
        let args =
            Args::try_parse_from(["vigil", "remove-subscription", "--user-id", "u1"]).unwrap();
        assert!(matches!(
            args.command,
            Command::RemoveSubscription { user_id } if user_id == "u1"
        ));
    }

    #[test]
    fn test_database_url_flag_is_global() {
        let args =
            Args::try_parse_from(["vigil", "diagnose", "--database-url", "postgres://db/vigil"])
                .unwrap();
        assert_eq!(args.database_url.as_deref(), Some("postgres://db/vigil"));

        let settings = load_settings(args.database_url.as_deref()).unwrap();
        assert_eq!(settings.database_url, "postgres://db/vigil");
    }

    #[test]
    fn test_unknown_scope_rejected() {
        assert!(Args::try_parse_from(["vigil", "send-alarm", "--scope", "everyone"]).is_err());
    }
}
