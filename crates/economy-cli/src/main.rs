use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use contracts::{CreditRequest, CreditSource, EconomyConfig, RewardEventType, TokenSource};
use economy_api::{serve, wall_clock_ms, EconomyApi, StaticTokenDirectory};
use economy_core::inventory::StaticAdInventory;
use tracing::warn;

fn print_usage() {
    println!("economy-cli <command>");
    println!("commands:");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
    println!("    bearer tokens from ECONOMY_AUTH_TOKENS (token=user,token=user)");
    println!("  balance <user_id>");
    println!("  credit <user_id> <coins> <lives> <source> <idempotency_key>");
    println!("  grant <user_id> <minutes> [source]");
    println!("  activate <user_id>");
    println!("  start-reward <user_id> <event_type> <original_reward>");
    println!("  complete-reward <session_id> [watched_ids_csv]");
    println!("  sweep");
    println!("  reconcile <user_id>");
    println!("sqlite path from ECONOMY_SQLITE_PATH (default economy_ledger.sqlite)");
}

fn parse_i64(value: Option<&String>, label: &str) -> Result<i64, String> {
    let raw = value.ok_or_else(|| format!("missing {label}"))?;
    raw.parse::<i64>()
        .map_err(|_| format!("invalid {label}: {raw}"))
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn parse_credit_source(value: Option<&String>) -> Result<CreditSource, String> {
    let raw = value.ok_or_else(|| "missing source".to_string())?;
    CreditSource::parse(raw).ok_or_else(|| format!("invalid source: {raw}"))
}

fn parse_token_source(value: Option<&String>) -> Result<TokenSource, String> {
    let raw = value.map(String::as_str).unwrap_or("purchase");
    TokenSource::parse(raw).ok_or_else(|| format!("invalid source: {raw}"))
}

fn parse_event_type(value: Option<&String>) -> Result<RewardEventType, String> {
    let raw = value.ok_or_else(|| "missing event_type".to_string())?;
    RewardEventType::parse(raw).ok_or_else(|| format!("invalid event_type: {raw}"))
}

fn default_sqlite_path() -> String {
    env::var("ECONOMY_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "economy_ledger.sqlite".to_string())
}

fn open_api() -> Result<EconomyApi, String> {
    EconomyApi::open(
        EconomyConfig::default(),
        default_sqlite_path(),
        Box::new(StaticAdInventory::default_catalog()),
    )
    .map_err(|err| format!("failed to open store: {err}"))
}

fn run_command(args: &[String]) -> Result<(), String> {
    let command = args.get(1).map(String::as_str).unwrap_or("");
    let mut api = open_api()?;
    let now_ms = wall_clock_ms();

    match command {
        "balance" => {
            let user_id = args.get(2).ok_or("missing user_id")?;
            let view = api
                .get_balance(user_id, None, now_ms)
                .map_err(|err| err.to_string())?;
            println!(
                "user_id={} coins={} lives={}/{} next_life_at_ms={:?}",
                view.user_id, view.coins, view.lives, view.max_lives, view.next_life_at_ms
            );
            if let Some(boost) = view.active_token {
                println!(
                    "active boost token_id={} remaining_minutes={}",
                    boost.token_id, boost.remaining_minutes
                );
            }
        }
        "credit" => {
            let user_id = args.get(2).ok_or("missing user_id")?.clone();
            let coins = parse_i64(args.get(3), "coins")?;
            let lives = parse_i64(args.get(4), "lives")?;
            let source = parse_credit_source(args.get(5))?;
            let key = args.get(6).ok_or("missing idempotency_key")?.clone();

            let request = CreditRequest::new(user_id, coins, lives, source, key);
            let outcome = api.credit(&request, now_ms).map_err(|err| err.to_string())?;
            println!("applied={} {}", outcome.applied, outcome.balance);
        }
        "grant" => {
            let user_id = args.get(2).ok_or("missing user_id")?;
            let minutes = parse_i64(args.get(3), "minutes")?;
            let source = parse_token_source(args.get(4))?;

            let token = api
                .grant_token(user_id, minutes, source, now_ms)
                .map_err(|err| err.to_string())?;
            println!(
                "granted token_id={} duration_minutes={}",
                token.token_id, token.duration_minutes
            );
        }
        "activate" => {
            let user_id = args.get(2).ok_or("missing user_id")?;
            let outcome = api
                .activate_token(user_id, now_ms)
                .map_err(|err| err.to_string())?;
            println!(
                "activated token_id={} expires_at_ms={:?} remaining_unused={}",
                outcome.token.token_id, outcome.token.expires_at_ms, outcome.remaining_unused
            );
        }
        "start-reward" => {
            let user_id = args.get(2).ok_or("missing user_id")?;
            let event_type = parse_event_type(args.get(3))?;
            let original_reward = parse_i64(args.get(4), "original_reward")?;

            let session = api
                .start_reward_session(user_id, event_type, original_reward, now_ms)
                .map_err(|err| err.to_string())?;
            println!(
                "session_id={} required_watch_count={} reserved={:?}",
                session.session_id, session.required_watch_count, session.reserved_item_ids
            );
        }
        "complete-reward" => {
            let session_id = args.get(2).ok_or("missing session_id")?;
            let watched: Vec<String> = args
                .get(3)
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            let outcome = api
                .complete_reward_session(session_id, &watched, now_ms)
                .map_err(|err| err.to_string())?;
            println!(
                "applied={} coins_delta={} lives_delta={} {}",
                outcome.applied, outcome.coins_delta, outcome.lives_delta, outcome.balance
            );
        }
        "sweep" => {
            let swept = api
                .sweep_expired_sessions(now_ms)
                .map_err(|err| err.to_string())?;
            println!("swept={swept}");
        }
        "reconcile" => {
            let user_id = args.get(2).ok_or("missing user_id")?;
            let balance = api
                .reconcile_snapshot(user_id, now_ms)
                .map_err(|err| err.to_string())?;
            println!("reconciled {balance}");
        }
        other => return Err(format!("unknown command: {other}")),
    }

    Ok(())
}

fn auth_directory() -> StaticTokenDirectory {
    match env::var("ECONOMY_AUTH_TOKENS") {
        Ok(raw) if !raw.trim().is_empty() => StaticTokenDirectory::from_pairs(&raw),
        _ => {
            warn!("ECONOMY_AUTH_TOKENS is not set; every request will be rejected as unauthorized");
            StaticTokenDirectory::new()
        }
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("serve") => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .init();

            match (parse_socket_addr(args.get(2)), open_api()) {
                (Ok(addr), Ok(api)) => {
                    println!("serving economy api on http://{addr}");
                    let verifier = Arc::new(auth_directory());
                    if let Err(err) = serve(addr, api, verifier).await {
                        eprintln!("server error: {err}");
                        std::process::exit(1);
                    }
                }
                (Err(err), _) | (_, Err(err)) => {
                    eprintln!("error: {err}");
                    print_usage();
                    std::process::exit(2);
                }
            }
        }
        Some(_) => {
            if let Err(err) = run_command(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        None => {
            print_usage();
        }
    }
}
