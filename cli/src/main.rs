//! `shard` — compile and verify sealed knowledge containers from the command line.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use shard_core::compile::{compile, Candidate, CompileInput, ContentFile, ShardMetadata};
use shard_core::identity::ObjectType;
use shard_core::merkle::MerkleLimits;
use shard_core::sign::SigningKeypair;
use shard_core::verify::verify;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Compile and verify sealed knowledge shards", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase output verbosity (-v for debug, -vv for trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify a shard directory against a trusted publisher key.
    Verify {
        shard_dir: PathBuf,
        /// Path to the raw public key bytes the shard must be signed with.
        #[arg(long)]
        trusted_key: PathBuf,
    },
    /// Compile a candidate stream and source files into a sealed shard.
    Compile {
        /// Path to a JSON compile request (see [`CompileRequest`]).
        request: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, value_enum, default_value_t = SuiteArg::Legacy)]
        suite: SuiteArg,
        /// Path to raw signing secret key bytes. Omit to generate a fresh
        /// post-quantum key (legacy requires an explicit key).
        #[arg(long)]
        signing_key: Option<PathBuf>,
        /// Required alongside a 2528-byte post-quantum secret key.
        #[arg(long)]
        external_public_key: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        compress_tables: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SuiteArg {
    Legacy,
    Pq,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Verify { shard_dir, trusted_key } => run_verify(&shard_dir, &trusted_key),
        Command::Compile { request, out, suite, signing_key, external_public_key, compress_tables } => {
            run_compile(&request, &out, suite, signing_key.as_deref(), external_public_key.as_deref(), compress_tables)
        }
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info,shard_core=info",
        1 => "debug,shard_core=debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn run_verify(shard_dir: &Path, trusted_key_path: &Path) -> Result<()> {
    let trusted_key = std::fs::read(trusted_key_path)
        .with_context(|| format!("reading trusted key from {}", trusted_key_path.display()))?;

    let report = verify(shard_dir, &trusted_key, &MerkleLimits::default())
        .context("verification crashed before producing a report")?;

    let errors: Vec<_> = report
        .errors
        .iter()
        .map(|e| serde_json::json!({"code": e.code.as_str(), "location": e.location.to_string(), "message": e.message}))
        .collect();
    let output = serde_json::json!({
        "state": format!("{:?}", report.state),
        "passed": report.passed(),
        "errors": errors,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if report.passed() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

/// The JSON shape a `shard compile` request file is read as.
#[derive(Debug, Deserialize)]
struct CompileRequest {
    metadata: RequestMetadata,
    content_files: Vec<RequestContentFile>,
    candidates: Vec<RequestCandidate>,
}

#[derive(Debug, Deserialize)]
struct RequestMetadata {
    title: String,
    namespace: String,
    publisher_id: String,
    publisher_name: String,
    license_spdx: String,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RequestContentFile {
    relpath: String,
    /// Path on disk, resolved relative to the request file's directory.
    source_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RequestCandidate {
    namespace: String,
    subject_label: String,
    subject_type: Option<String>,
    predicate: String,
    object: String,
    object_type: String,
    object_entity_type: Option<String>,
    tier: u8,
    evidence_text: String,
    source_hash: String,
    byte_start: u64,
    byte_end: u64,
}

fn parse_object_type(raw: &str) -> Result<ObjectType> {
    match raw {
        "entity" => Ok(ObjectType::Entity),
        "literal:string" => Ok(ObjectType::LiteralString),
        other => bail!("unknown object_type '{other}', expected 'entity' or 'literal:string'"),
    }
}

fn run_compile(
    request_path: &Path,
    out: &Path,
    suite: SuiteArg,
    signing_key_path: Option<&Path>,
    external_public_key_path: Option<&Path>,
    compress_tables: bool,
) -> Result<()> {
    let request_text = std::fs::read_to_string(request_path)
        .with_context(|| format!("reading compile request from {}", request_path.display()))?;
    let request: CompileRequest =
        serde_json::from_str(&request_text).context("parsing compile request JSON")?;
    let base_dir = request_path.parent().unwrap_or_else(|| Path::new("."));

    let mut content_files = Vec::with_capacity(request.content_files.len());
    for f in &request.content_files {
        let bytes = std::fs::read(base_dir.join(&f.source_path))
            .with_context(|| format!("reading content file {}", f.source_path.display()))?;
        content_files.push(ContentFile { relpath: f.relpath.clone(), bytes });
    }

    let mut candidates = Vec::with_capacity(request.candidates.len());
    for c in request.candidates {
        candidates.push(Candidate {
            namespace: c.namespace,
            subject_label: c.subject_label,
            subject_type: c.subject_type,
            predicate: c.predicate,
            object: c.object,
            object_type: parse_object_type(&c.object_type)?,
            object_entity_type: c.object_entity_type,
            tier: c.tier,
            evidence_text: c.evidence_text,
            source_hash: c.source_hash,
            byte_start: c.byte_start,
            byte_end: c.byte_end,
        });
    }

    let signing_key = load_signing_key(suite, signing_key_path, external_public_key_path)?;

    let input = CompileInput {
        candidates,
        content_files,
        metadata: ShardMetadata {
            title: request.metadata.title,
            namespace: request.metadata.namespace,
            publisher_id: request.metadata.publisher_id,
            publisher_name: request.metadata.publisher_name,
            license_spdx: request.metadata.license_spdx,
            created_at: request.metadata.created_at,
        },
        signing_key,
        out_dir: out.to_path_buf(),
        table_compression: compress_tables,
        merkle_limits: MerkleLimits::default(),
    };

    let written = compile(input).context("compilation failed")?;
    tracing::info!("sealed shard written to {}", written.display());
    Ok(())
}

fn load_signing_key(
    suite: SuiteArg,
    signing_key_path: Option<&Path>,
    external_public_key_path: Option<&Path>,
) -> Result<SigningKeypair> {
    match (suite, signing_key_path) {
        (SuiteArg::Legacy, None) => bail!("--signing-key is required for the legacy suite"),
        (SuiteArg::Legacy, Some(path)) => {
            let bytes = std::fs::read(path).with_context(|| format!("reading signing key from {}", path.display()))?;
            Ok(SigningKeypair::load_ed25519(&bytes)?)
        }
        (SuiteArg::Pq, None) => Ok(SigningKeypair::generate_post_quantum()),
        (SuiteArg::Pq, Some(path)) => {
            let bytes = std::fs::read(path).with_context(|| format!("reading signing key from {}", path.display()))?;
            let external_public_key = external_public_key_path
                .map(std::fs::read)
                .transpose()
                .context("reading external public key")?;
            Ok(SigningKeypair::load_post_quantum(&bytes, external_public_key.as_deref())?)
        }
    }
}
