//! `codegen` CLI: run the plan → generate → review loop against a repository.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codegen::agents::planner::{PlannerAgent, PlannerAgentConfig};
use codegen::agents::worker::{WorkerAgent, WorkerAgentConfig};
use codegen::core::chunker::{Chunker, split_sections};
use codegen::core::fingerprint::fingerprint;
use codegen::exit_codes;
use codegen::io::completion::{CodexCompletion, CompletionService};
use codegen::io::config::{CodegenConfig, CompletionBackend, load_config};
use codegen::io::openai::OpenAiCompletion;
use codegen::io::record_store::JsonlRecordStore;
use codegen::io::source::GitSourceProvider;
use codegen::logging;
use codegen::orchestrator::{Orchestrator, OrchestratorConfig};
use codegen::service::CodegenService;

#[derive(Parser)]
#[command(
    name = "codegen",
    version,
    about = "Iterative LLM code generation: plan, generate a diff, review, repeat"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a diff for a GitHub repository and print the result as JSON.
    Run {
        /// Repository URL (`https://github.com/<owner>/<repo>`).
        #[arg(long)]
        repo: String,
        /// Change request in natural language.
        #[arg(long)]
        prompt: String,
        /// TOML config file (defaults apply if missing).
        #[arg(long, default_value = "codegen.toml")]
        config: PathBuf,
        /// Directory for JSONL request records.
        #[arg(long)]
        records: Option<PathBuf>,
    },
    /// Print the workspace fingerprint of a repository and prompt.
    Fingerprint { repo: String, prompt: String },
    /// Print the chunk boundaries of a fetched content file.
    Chunk {
        file: PathBuf,
        /// Upper bound per chunk, in characters.
        #[arg(long)]
        max_chars: Option<usize>,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match dispatch(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn dispatch(command: Command) -> Result<i32> {
    match command {
        Command::Run {
            repo,
            prompt,
            config,
            records,
        } => cmd_run(&repo, &prompt, &config, records),
        Command::Fingerprint { repo, prompt } => {
            println!("{}", fingerprint(&repo, &prompt));
            Ok(exit_codes::OK)
        }
        Command::Chunk { file, max_chars } => cmd_chunk(&file, max_chars),
    }
}

fn cmd_run(repo: &str, prompt: &str, config_path: &Path, records: Option<PathBuf>) -> Result<i32> {
    let config = load_config(config_path)?;
    let completion = build_completion(&config)?;

    let planner = PlannerAgent::new(
        &*completion,
        PlannerAgentConfig {
            success_score_threshold: config.success_score_threshold,
            prompt_budget_bytes: config.prompt_budget_bytes,
            timeout: config.completion_timeout(),
        },
    )?;
    let worker = WorkerAgent::new(
        &*completion,
        WorkerAgentConfig {
            prompt_budget_bytes: config.prompt_budget_bytes,
            timeout: config.completion_timeout(),
        },
    )?;
    let source = GitSourceProvider::new(config.clone_timeout(), config.output_limit_bytes);
    let orchestrator =
        Orchestrator::new(source, planner, worker, OrchestratorConfig::from(&config));

    let records_dir = records.unwrap_or_else(|| config.workspace_base_dir.join("records"));
    let service = CodegenService::new(orchestrator, JsonlRecordStore::new(records_dir));
    let result = service.request_codegen(repo, prompt)?;

    let output = serde_json::to_string_pretty(&result).context("serialize result")?;
    println!("{output}");
    Ok(if result.exceeded_max_attempts {
        exit_codes::EXHAUSTED
    } else {
        exit_codes::OK
    })
}

fn build_completion(config: &CodegenConfig) -> Result<Box<dyn CompletionService>> {
    let completion = &config.completion;
    Ok(match completion.backend {
        CompletionBackend::Openai => Box::new(OpenAiCompletion::from_env(
            &completion.api_key_env,
            &completion.base_url,
            &completion.model,
        )?),
        CompletionBackend::Codex => Box::new(CodexCompletion::new(
            Some(completion.model.clone()),
            config.output_limit_bytes,
        )),
    })
}

fn cmd_chunk(file: &Path, max_chars: Option<usize>) -> Result<i32> {
    let content =
        fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let chunker = max_chars.map_or_else(Chunker::default, Chunker::new);
    for (idx, chunk) in chunker.chunk(&content).iter().enumerate() {
        let paths: Vec<&str> = split_sections(chunk)
            .iter()
            .filter_map(|section| section.path)
            .collect();
        println!(
            "chunk {idx}: {} chars, files: {}",
            chunk.chars().count(),
            paths.join(", ")
        );
    }
    Ok(exit_codes::OK)
}
