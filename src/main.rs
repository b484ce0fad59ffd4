use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context as _, Result};
use base64::{engine::general_purpose, Engine as _};
use clap::{Args, Parser, Subcommand};
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use hold_ledger::{
    app::{App, AppState},
    bank::Balance,
    coin::{Coin, Coins},
    config::HoldConfig,
    events::HoldEvent,
    keeper::query::{GetAllHoldsRequest, GetHoldsRequest, PageRequest},
    simulation, Address,
};

#[derive(Parser)]
#[command(name = "hold-ledger", version, about = "Inspect and drive an account fund-hold ledger")]
struct Cli {
    /// JSON file with hold settings (default_page_limit, bond_denom).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override default_page_limit.
    #[arg(long, global = true)]
    default_page_limit: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check an app state file and load it.
    Validate { state: PathBuf },
    /// Show what one address has on hold.
    Get { state: PathBuf, address: String },
    /// List holds for all addresses, a page at a time.
    All(AllArgs),
    /// Run the hold invariant.
    Invariant { state: PathBuf },
    /// Load and re-export an app state.
    Export {
        state: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Put funds on hold and write the resulting state.
    Add(ChangeArgs),
    /// Release held funds and write the resulting state.
    Release(ChangeArgs),
    /// Generate a random app state.
    Simulate {
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value_t = 10)]
        accounts: usize,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args)]
struct AllArgs {
    state: PathBuf,
    #[arg(long, default_value_t = 0)]
    limit: u64,
    #[arg(long, default_value_t = 0)]
    offset: u64,
    /// next_key from a previous page, base64.
    #[arg(long)]
    page_key: Option<String>,
    #[arg(long)]
    count_total: bool,
    #[arg(long)]
    reverse: bool,
}

#[derive(Args)]
struct ChangeArgs {
    state: PathBuf,
    address: String,
    /// e.g. 10banana,3cucumber
    coins: String,
    #[arg(long, default_value = "cli")]
    reason: String,
    /// Where to write the new state; stdout when absent.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Serialize)]
struct ValidateOutput {
    valid: bool,
    accounts: usize,
    total: Coins,
    state_root: String,
}

#[derive(Serialize)]
struct ChangeOutput {
    applied: Coins,
    errors: Vec<String>,
    events: Vec<HoldEvent>,
    state: AppState,
}

#[derive(Serialize)]
struct InvariantOutput {
    broken: bool,
    report: String,
}

fn load_config(cli: &Cli) -> Result<HoldConfig> {
    let mut cfg = match &cli.config {
        Some(path) => HoldConfig::from_json_file(path)?,
        None => HoldConfig::default(),
    };
    if let Some(limit) = cli.default_page_limit {
        cfg.default_page_limit = limit;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn read_state(path: &Path) -> Result<AppState> {
    let raw = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn load_app(path: &Path, cfg: &HoldConfig) -> Result<App> {
    let state = read_state(path)?;
    App::from_state(&state, cfg.clone()).with_context(|| format!("loading {}", path.display()))
}

fn write_json<T: Serialize>(out: Option<&Path>, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    match out {
        Some(p) => {
            if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
            }
            fs::write(p, &bytes).with_context(|| format!("writing {}", p.display()))?;
            tracing::info!(path = %p.display(), "wrote state");
        }
        None => std::io::stdout().write_all(&bytes)?,
    }
    Ok(())
}

fn validate_cmd(state: &Path, cfg: &HoldConfig) -> Result<()> {
    let app = load_app(state, cfg)?;
    let exported = app.export()?;
    write_json(
        None,
        &ValidateOutput {
            valid: true,
            accounts: exported.hold.holds.len(),
            total: exported.hold.total(),
            state_root: hex::encode(exported.hold.state_root()),
        },
    )
}

fn get_cmd(state: &Path, address: &str, cfg: &HoldConfig) -> Result<()> {
    let app = load_app(state, cfg)?;
    let resp = app.keeper.get_holds(
        app.ctx(),
        &GetHoldsRequest {
            address: address.to_string(),
        },
    )?;
    write_json(None, &resp)
}

fn all_cmd(args: &AllArgs, cfg: &HoldConfig) -> Result<()> {
    let app = load_app(&args.state, cfg)?;
    let key = match &args.page_key {
        Some(k) => general_purpose::STANDARD
            .decode(k.trim())
            .context("--page-key is not base64")?,
        None => Vec::new(),
    };
    let req = GetAllHoldsRequest {
        pagination: Some(PageRequest {
            key,
            offset: args.offset,
            limit: args.limit,
            count_total: args.count_total,
            reverse: args.reverse,
        }),
    };
    let resp = app.keeper.get_all_holds(app.ctx(), Some(&req))?;
    write_json(None, &resp)
}

fn invariant_cmd(state: &Path, cfg: &HoldConfig) -> Result<()> {
    let app = load_app(state, cfg)?;
    let results = app.invariants.check_all(app.ctx());
    let broken = results.iter().any(|(_, broken)| *broken);
    let outputs: Vec<InvariantOutput> = results
        .into_iter()
        .map(|(report, broken)| InvariantOutput { broken, report })
        .collect();
    write_json(None, &outputs)?;
    if broken {
        bail!("invariant broken");
    }
    Ok(())
}

fn export_cmd(state: &Path, out: Option<&Path>, cfg: &HoldConfig) -> Result<()> {
    let app = load_app(state, cfg)?;
    let exported = app.export()?;
    tracing::info!(
        accounts = exported.hold.holds.len(),
        state_root = %hex::encode(exported.hold.state_root()),
        "exported"
    );
    write_json(out, &exported)
}

fn change_cmd(args: &ChangeArgs, release: bool, cfg: &HoldConfig) -> Result<()> {
    let app = load_app(&args.state, cfg)?;
    let addr: Address = args
        .address
        .parse()
        .with_context(|| format!("invalid address {:?}", args.address))?;
    let funds: Coins = args
        .coins
        .parse()
        .with_context(|| format!("invalid coins {:?}", args.coins))?;

    let partial = if release {
        app.keeper.release_hold(app.ctx(), &addr, &funds)?
    } else {
        app.keeper.add_hold(app.ctx(), &addr, &funds, &args.reason)?
    };
    let errors: Vec<String> = partial.errors.iter().map(ToString::to_string).collect();
    for err in &errors {
        tracing::warn!(%addr, error = %err, "not applied");
    }

    let state = app.export()?;
    let output = ChangeOutput {
        applied: partial.value,
        errors,
        events: app.ctx().event_manager().drain(),
        state,
    };
    write_json(args.out.as_deref(), &output)
}

fn simulate_cmd(seed: u64, accounts: usize, out: Option<&Path>, cfg: &HoldConfig) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let addrs: Vec<Address> = (0..accounts)
        .map(|_| {
            let mut bytes = [0u8; 20];
            rng.fill_bytes(&mut bytes);
            Address::new(bytes.to_vec())
        })
        .collect::<Result<_, _>>()?;

    let mut state = AppState::default();
    for addr in &addrs {
        let amount = rng.gen_range(0..=1_000_000u64);
        state.bank.balances.push(Balance {
            address: addr.clone(),
            coins: Coins::new([Coin::new(cfg.bond_denom.as_str(), amount)]),
        });
    }
    state.hold = simulation::randomized_gen_state(&mut rng, &addrs, &mut state.bank, &cfg.bond_denom)?;

    // Make sure what we hand out actually loads.
    App::from_state(&state, cfg.clone()).context("generated state does not load")?;
    write_json(out, &state)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    match &cli.command {
        Command::Validate { state } => validate_cmd(state, &cfg),
        Command::Get { state, address } => get_cmd(state, address, &cfg),
        Command::All(args) => all_cmd(args, &cfg),
        Command::Invariant { state } => invariant_cmd(state, &cfg),
        Command::Export { state, out } => export_cmd(state, out.as_deref(), &cfg),
        Command::Add(args) => change_cmd(args, false, &cfg),
        Command::Release(args) => change_cmd(args, true, &cfg),
        Command::Simulate { seed, accounts, out } => simulate_cmd(*seed, *accounts, out.as_deref(), &cfg),
    }
}
