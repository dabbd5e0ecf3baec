//! attest-cli
//!
//! Thin command-line front end over [`chain_attest::Pipeline`]. Every command
//! runs one stage and prints its JSON output to stdout.
//!
//! Exit codes: `0` stage succeeded, `1` stage ran but reported `ok: false`,
//! `2` the stage could not run (bad input, missing artifact, transport error).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};

use chain_attest::artifacts::FsArtifactStore;
use chain_attest::blockchain::{BlockchainClient, FeeOverrides, Wallet};
use chain_attest::config::{load_config, AttestConfig, Secrets};
use chain_attest::observability::{logging, metrics};
use chain_attest::pipeline::{
    CallMethod, ClaimRewardArgs, ContractTarget, PrepareReportArgs, PrepareRewardArgs, RegisterDatasetArgs,
    RegisterSuiteArgs, RegisterValidationArgs,
};
use chain_attest::tasks::HttpJobService;
use chain_attest::{Pipeline, PipelineError, PipelineOptions, StageOutput};

#[derive(Parser)]
#[command(name = "attest-cli")]
#[command(about = "Run attestation pipeline stages", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Network name; defaults to `ledger.network` from the config.
    #[arg(long, global = true)]
    network: Option<String>,

    /// Submit remote jobs without waiting for them.
    #[arg(long, global = true)]
    no_poll: bool,

    /// Polling deadline in seconds.
    #[arg(long, global = true)]
    timeout: Option<f64>,

    /// Seconds between polls.
    #[arg(long, global = true)]
    interval: Option<f64>,

    /// Do not write artifacts.
    #[arg(long, global = true)]
    no_store: bool,

    /// Fail instead of recording reverts and failed jobs.
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit the prepare-suite job
    PrepareSuite(JsonPayload),
    /// Create the dataset request for a prepared suite
    RegisterSuite {
        #[arg(long)]
        suite_id: String,
        #[arg(long)]
        bounty_eth: f64,
        /// Default: chosen from the prepared artifacts
        #[arg(long, value_enum)]
        method: Option<MethodArg>,
        #[command(flatten)]
        contract: ContractArgs,
        #[command(flatten)]
        fees: FeeArgs,
    },
    /// Submit the prepare-report job for a dataset
    PrepareReport {
        #[arg(long)]
        suite_id: String,
        #[arg(long)]
        catalog_id: String,
        #[arg(long)]
        include_report: bool,
    },
    /// Register a dataset on-chain
    RegisterDataset {
        #[arg(long)]
        suite_id: String,
        #[arg(long)]
        catalog_id: String,
        #[arg(long)]
        dataset_uri: String,
        /// Externally produced signature (0x...); the local key signs otherwise
        #[arg(long)]
        signature: Option<String>,
        #[command(flatten)]
        contract: ContractArgs,
        #[command(flatten)]
        fees: FeeArgs,
    },
    /// Submit the prepare-reward job for a registered dataset
    PrepareReward {
        #[arg(long)]
        suite_id: String,
        #[arg(long)]
        catalog_id: String,
        #[arg(long)]
        project_id: String,
        #[arg(long, default_value = "dataset")]
        category: String,
        #[arg(long, default_value_t = 900)]
        expires_in_sec: u64,
    },
    /// Claim the reward and mint
    ClaimReward {
        #[arg(long)]
        suite_id: String,
        #[arg(long)]
        catalog_id: String,
        /// Default: read from the suite registration receipt
        #[arg(long)]
        request_id: Option<u64>,
        #[command(flatten)]
        contract: ContractArgs,
        #[command(flatten)]
        fees: FeeArgs,
    },
    /// Submit the prepare-validation job
    PrepareValidation(JsonPayload),
    /// Submit a prepared validation
    RegisterValidation {
        #[arg(long)]
        fingerprint: String,
        #[command(flatten)]
        contract: ContractArgs,
        #[command(flatten)]
        fees: FeeArgs,
    },
    /// Re-populate the contract registry cache
    RefreshContracts {
        #[arg(long, default_value_t = 100)]
        per_page: u32,
    },
}

#[derive(Args)]
struct JsonPayload {
    /// Inline JSON payload
    #[arg(long, conflicts_with = "json_file")]
    json: Option<String>,
    /// Path to a JSON payload
    #[arg(long)]
    json_file: Option<PathBuf>,
}

#[derive(Args)]
struct ContractArgs {
    /// Logical name in the registry index
    #[arg(long)]
    registry_name: Option<String>,
    /// Explicit contract address
    #[arg(long)]
    registry_address: Option<String>,
}

#[derive(Args)]
struct FeeArgs {
    #[arg(long)]
    max_fee_gwei: Option<f64>,
    #[arg(long)]
    max_priority_fee_gwei: Option<f64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Plain,
    Sig,
}

impl From<ContractArgs> for ContractTarget {
    fn from(args: ContractArgs) -> Self {
        ContractTarget {
            name: args.registry_name,
            address: args.registry_address,
        }
    }
}

impl From<FeeArgs> for FeeOverrides {
    fn from(args: FeeArgs) -> Self {
        FeeOverrides {
            max_fee_gwei: args.max_fee_gwei,
            max_priority_fee_gwei: args.max_priority_fee_gwei,
        }
    }
}

impl From<MethodArg> for CallMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Plain => CallMethod::Plain,
            MethodArg::Sig => CallMethod::Sig,
        }
    }
}

type CliPipeline = Pipeline<HttpJobService, BlockchainClient, FsArtifactStore>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: failed to load {}: {}", path.display(), e);
                return ExitCode::from(2);
            }
        },
        None => AttestConfig::default(),
    };
    logging::init_logging(&config.observability);
    metrics::set_enabled(config.observability.metrics_enabled);

    match run(cli, config).await {
        Ok(out) => {
            print_json(&out.to_json());
            if out.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(err) => {
            tracing::error!(code = err.code(), error = %err, "Stage aborted");
            let out = StageOutput::failure("attest-cli", &err, None);
            print_json(&out.to_json());
            ExitCode::from(2)
        }
    }
}

fn secrets_from_env() -> Secrets {
    let read = |name: &str| std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    Secrets {
        signer_key: read("ATTEST_SIGNER_KEY"),
        backend_token: read("ATTEST_BACKEND_TOKEN"),
        rpc_url: read("ATTEST_RPC_URL"),
    }
}

async fn build(cli: &Cli, config: AttestConfig) -> Result<CliPipeline, PipelineError> {
    let secrets = secrets_from_env();
    let network = cli
        .network
        .clone()
        .unwrap_or_else(|| config.ledger.network.clone());

    let store = FsArtifactStore::open(&config.storage.root)?;
    let jobs = HttpJobService::new(&config.job_service, config.retries.clone(), secrets.backend_token.clone())?;
    let node = BlockchainClient::connect(&config.ledger, &network, secrets.rpc_url.as_deref()).await?;

    let mut options = PipelineOptions::from_config(&config.polling);
    options.poll = !cli.no_poll;
    options.no_store = cli.no_store;
    options.strict = cli.strict;
    if let Some(secs) = cli.timeout {
        options.timeout = Duration::from_secs_f64(secs.max(0.0));
    }
    if let Some(secs) = cli.interval {
        options.interval = Duration::from_secs_f64(secs.max(0.0));
    }

    let mut pipeline = Pipeline::new(jobs, node, store, config).with_options(options);
    if let Some(key) = &secrets.signer_key {
        pipeline = pipeline.with_wallet(Wallet::from_private_key(key)?);
    }
    Ok(pipeline)
}

async fn run(cli: Cli, config: AttestConfig) -> Result<StageOutput, PipelineError> {
    let pipeline = build(&cli, config).await?;
    let network = cli.network;

    match cli.command {
        Commands::PrepareSuite(payload) => pipeline.prepare_suite(payload.load()?).await,
        Commands::RegisterSuite {
            suite_id,
            bounty_eth,
            method,
            contract,
            fees,
        } => {
            let args = RegisterSuiteArgs {
                network,
                method: method.map(CallMethod::from),
                contract: contract.into(),
                fees: fees.into(),
                ..RegisterSuiteArgs::new(suite_id, bounty_eth)
            };
            pipeline.register_suite(args).await
        }
        Commands::PrepareReport {
            suite_id,
            catalog_id,
            include_report,
        } => {
            let args = PrepareReportArgs {
                network,
                suite_id,
                catalog_id,
                include_report,
            };
            pipeline.prepare_report(args).await
        }
        Commands::RegisterDataset {
            suite_id,
            catalog_id,
            dataset_uri,
            signature,
            contract,
            fees,
        } => {
            let args = RegisterDatasetArgs {
                network,
                signature,
                contract: contract.into(),
                fees: fees.into(),
                ..RegisterDatasetArgs::new(suite_id, catalog_id, dataset_uri)
            };
            pipeline.register_dataset(args).await
        }
        Commands::PrepareReward {
            suite_id,
            catalog_id,
            project_id,
            category,
            expires_in_sec,
        } => {
            let args = PrepareRewardArgs {
                network,
                category,
                expires_in_sec,
                ..PrepareRewardArgs::new(suite_id, catalog_id, project_id)
            };
            pipeline.prepare_reward(args).await
        }
        Commands::ClaimReward {
            suite_id,
            catalog_id,
            request_id,
            contract,
            fees,
        } => {
            let args = ClaimRewardArgs {
                network,
                request_id,
                contract: contract.into(),
                fees: fees.into(),
                ..ClaimRewardArgs::new(suite_id, catalog_id)
            };
            pipeline.claim_reward(args).await
        }
        Commands::PrepareValidation(payload) => pipeline.prepare_validation(payload.load()?).await,
        Commands::RegisterValidation {
            fingerprint,
            contract,
            fees,
        } => {
            let args = RegisterValidationArgs {
                network,
                contract: contract.into(),
                fees: fees.into(),
                ..RegisterValidationArgs::new(fingerprint)
            };
            pipeline.register_validation(args).await
        }
        Commands::RefreshContracts { per_page } => pipeline.refresh_contracts(network.as_deref(), per_page).await,
    }
}

impl JsonPayload {
    fn load(self) -> Result<Value, PipelineError> {
        let text = match (self.json, self.json_file) {
            (Some(text), _) => text,
            (None, Some(path)) => std::fs::read_to_string(&path)
                .map_err(|e| PipelineError::validation(format!("cannot read {}: {}", path.display(), e)))?,
            (None, None) => return Err(PipelineError::validation("pass --json or --json-file")),
        };
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| PipelineError::validation(format!("payload is not valid JSON: {}", e)))?;
        if !value.is_object() {
            return Err(PipelineError::validation("payload must be a JSON object"));
        }
        Ok(value)
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => println!("{}", json!({ "ok": false, "error": { "message": e.to_string() } })),
    }
}
