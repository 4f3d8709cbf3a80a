use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rl_admission::{generate_credential, hash_secret, KeyEnvironment, DEFAULT_KEY_SCOPES};
use rl_config::ListenerConfig;
use rl_schemas::FetcherStatus;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rl")]
#[command(about = "Report listener operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Fetcher (tenant) records
    Fetcher {
        #[command(subcommand)]
        cmd: FetcherCmd,
    },

    /// Fetcher API keys
    Key {
        #[command(subcommand)]
        cmd: KeyCmd,
    },

    /// Live-feed resume checkpoints
    Checkpoint {
        #[command(subcommand)]
        cmd: CheckpointCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply embedded SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum FetcherCmd {
    /// Create a fetcher with default caps (0 = unlimited).
    Create {
        #[arg(long)]
        id: String,

        #[arg(long)]
        name: String,

        #[arg(long, default_value = "internal")]
        owner_type: String,

        #[arg(long, default_value_t = 20)]
        per_minute: i64,

        #[arg(long, default_value_t = 200)]
        daily: i64,
    },

    /// Change lifecycle status (active | limited | suspended).
    SetStatus {
        #[arg(long)]
        id: String,

        #[arg(long)]
        status: String,
    },
}

#[derive(Subcommand)]
enum KeyCmd {
    /// Mint a key. The full token is printed once and never stored.
    Issue {
        #[arg(long)]
        fetcher: String,

        /// Issuing environment: live | test (anything else mints test keys).
        /// Defaults to `fetcher_keys.environment` from the RL_CONFIG layers.
        #[arg(long)]
        environment: Option<String>,

        /// Comma-separated scopes; defaults to report:submit,fetcher:read
        #[arg(long, value_delimiter = ',')]
        scopes: Vec<String>,

        /// Per-key override of the fetcher's per-minute cap
        #[arg(long)]
        per_minute: Option<i64>,

        /// Per-key override of the fetcher's daily cap
        #[arg(long)]
        daily: Option<i64>,
    },

    Revoke {
        #[arg(long)]
        key_id: String,
    },

    List {
        #[arg(long)]
        fetcher: String,
    },
}

#[derive(Subcommand)]
enum CheckpointCmd {
    /// Print every stored checkpoint.
    Show,

    /// Overwrite a service's checkpoint (e.g. to replay or skip a range).
    Set {
        #[arg(long)]
        service: String,

        #[arg(long)]
        seq: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = rl_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = rl_db::status(&pool).await?;
                    println!("db_ok={} has_fetcher_tables={}", s.ok, s.has_fetcher_tables);
                }
                DbCmd::Migrate => {
                    rl_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::Fetcher { cmd } => match cmd {
            FetcherCmd::Create {
                id,
                name,
                owner_type,
                per_minute,
                daily,
            } => {
                let pool = rl_db::connect_from_env().await?;
                rl_db::fetchers::insert_fetcher(
                    &pool,
                    &rl_db::NewFetcher {
                        fetcher_id: id.clone(),
                        name,
                        owner_type,
                        status: FetcherStatus::Active,
                        per_minute_cap_items: per_minute,
                        daily_cap_items: daily,
                    },
                )
                .await?;
                info!(fetcher_id = %id, per_minute, daily, "fetcher created");
                println!("fetcher_id={id} status=active per_minute={per_minute} daily={daily}");
            }

            FetcherCmd::SetStatus { id, status } => {
                let status = parse_fetcher_status(&status)?;
                let pool = rl_db::connect_from_env().await?;
                if !rl_db::fetchers::set_fetcher_status(&pool, &id, status).await? {
                    bail!("fetcher not found: {id}");
                }
                info!(fetcher_id = %id, status = status.as_str(), "fetcher status changed");
                println!("fetcher_id={id} status={}", status.as_str());
            }
        },

        Commands::Key { cmd } => match cmd {
            KeyCmd::Issue {
                fetcher,
                environment,
                scopes,
                per_minute,
                daily,
            } => {
                let environment = issuing_environment(environment.as_deref())?;
                let prefix = environment.issuing_prefix();
                let scopes = if scopes.is_empty() {
                    DEFAULT_KEY_SCOPES.iter().map(|s| s.to_string()).collect()
                } else {
                    scopes
                        .into_iter()
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                };

                let pool = rl_db::connect_from_env().await?;
                let issued = generate_credential(prefix);
                let key_hash = hash_secret(&issued.secret).context("hash new key secret")?;
                rl_db::fetchers::insert_key(
                    &pool,
                    &rl_db::NewFetcherKey {
                        key_id: issued.key_id.clone(),
                        fetcher_id: fetcher.clone(),
                        key_prefix: prefix.as_str().to_string(),
                        key_hash,
                        scopes: scopes.clone(),
                        per_minute_cap_items: per_minute,
                        daily_cap_items: daily,
                    },
                )
                .await?;
                info!(
                    fetcher_id = %fetcher,
                    key_id = %issued.key_id,
                    environment = ?environment,
                    "key issued"
                );
                println!("fetcher_id={fetcher}");
                println!("key_id={}", issued.key_id);
                println!("scopes={}", scopes.join(","));
                // Shown exactly once; only the hash is stored.
                println!("token={}", issued.token);
            }

            KeyCmd::Revoke { key_id } => {
                let pool = rl_db::connect_from_env().await?;
                if !rl_db::fetchers::revoke_key(&pool, &key_id).await? {
                    bail!("key not found: {key_id}");
                }
                info!(key_id = %key_id, "key revoked");
                println!("revoked=true key_id={key_id}");
            }

            KeyCmd::List { fetcher } => {
                let pool = rl_db::connect_from_env().await?;
                for k in rl_db::fetchers::list_keys(&pool, &fetcher).await? {
                    println!(
                        "key_id={} prefix={} status={} scopes={} created_at={} last_used_at={}",
                        k.key_id,
                        k.key_prefix,
                        k.status.as_str(),
                        k.scopes.join(","),
                        k.created_at.to_rfc3339(),
                        opt_dt(&k.last_used_at)
                    );
                }
            }
        },

        Commands::Checkpoint { cmd } => {
            let pool = rl_db::connect_from_env().await?;
            match cmd {
                CheckpointCmd::Show => {
                    for row in rl_db::checkpoint::list(&pool).await? {
                        println!(
                            "service={} last_processed_seq={} updated_at={}",
                            row.service_name,
                            row.last_processed_seq,
                            row.updated_at.to_rfc3339()
                        );
                    }
                }
                CheckpointCmd::Set { service, seq } => {
                    if seq < 0 {
                        bail!("seq must be >= 0");
                    }
                    let previous = rl_db::checkpoint::load(&pool, &service).await?;
                    rl_db::checkpoint::store(&pool, &service, seq).await?;
                    warn!(service = %service, previous = ?previous, seq, "checkpoint overwritten");
                    println!("service={service} last_processed_seq={seq}");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = rl_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
}

/// Explicit flag wins; otherwise the deployment's configured key environment.
fn issuing_environment(flag: Option<&str>) -> Result<KeyEnvironment> {
    if let Some(raw) = flag {
        return Ok(KeyEnvironment::parse(raw));
    }
    let loaded = rl_config::load_from_env().context("load RL_CONFIG for key environment")?;
    let cfg = ListenerConfig::from_config_json(&loaded.config_json)?;
    Ok(KeyEnvironment::parse(&cfg.admission.key_environment))
}

fn parse_fetcher_status(s: &str) -> Result<FetcherStatus> {
    match s.trim().to_ascii_lowercase().as_str() {
        "active" => Ok(FetcherStatus::Active),
        "limited" => Ok(FetcherStatus::Limited),
        "suspended" => Ok(FetcherStatus::Suspended),
        other => bail!("unknown fetcher status '{other}' (expected active|limited|suspended)"),
    }
}

fn opt_dt(v: &Option<DateTime<Utc>>) -> String {
    v.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_environment_flag_wins() {
        assert_eq!(issuing_environment(Some("production")).unwrap(), KeyEnvironment::Live);
        assert_eq!(issuing_environment(Some("test")).unwrap(), KeyEnvironment::Test);
    }
}
