use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

const DEFAULT_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data");

#[derive(Parser, Debug)]
#[command(name = "cost-navigator")]
#[command(about = "Hospital procedure cost and rating navigator (DuckDB + axum)", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load ZIP centroids and a CMS inpatient charges CSV into DuckDB.
    Load(LoadArgs),
    /// Serve the HTTP API (requires a completed load).
    Serve(ServeArgs),
    /// Print ranked providers for a DRG and location as JSON.
    Search(SearchArgs),
    /// Answer a free-text question and print the answer as JSON.
    Ask(AskArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct LoadArgs {
    /// Data directory (DuckDB database and GeoNames files).
    #[arg(long, env = "NAVIGATOR_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    /// CMS "Medicare Inpatient Hospitals by Provider and Service" CSV.
    #[arg(long)]
    pub csv: PathBuf,

    /// Do not download missing ZIP centroids; error instead.
    #[arg(long)]
    pub offline: bool,

    /// Re-download GeoNames US.zip even if US.txt already exists.
    #[arg(long)]
    pub force_download: bool,

    /// Use an already-downloaded ZIP centroid file (GeoNames tab-separated format).
    #[arg(long)]
    pub zip_centroids_file: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantKind {
    /// Offline: template from the question's intent, parameters from extracted slots.
    Rules,
    /// Ollama `/api/generate` in JSON mode.
    Ollama,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AssistantArgs {
    #[arg(long, env = "NAVIGATOR_ASSISTANT", value_enum, default_value_t = AssistantKind::Rules)]
    pub assistant: AssistantKind,

    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    pub ollama_url: String,

    #[arg(long, env = "OLLAMA_MODEL", default_value = "llama3.1")]
    pub ollama_model: String,

    /// Upper bound for one assistant call, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    pub assistant_timeout_ms: u64,

    /// Pause before retrying a transient assistant failure, in milliseconds.
    #[arg(long, default_value_t = 500)]
    pub assistant_backoff_ms: u64,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, env = "NAVIGATOR_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8787)]
    pub port: u16,

    #[command(flatten)]
    pub assistant: AssistantArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SearchArgs {
    #[arg(long, env = "NAVIGATOR_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    /// MS-DRG code or description fragment.
    #[arg(long)]
    pub drg: Option<String>,

    #[arg(long)]
    pub zip: Option<String>,

    #[arg(long)]
    pub radius_km: Option<f64>,

    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AskArgs {
    #[arg(long, env = "NAVIGATOR_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    pub question: String,

    #[command(flatten)]
    pub assistant: AssistantArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_flags() {
        let args = Args::try_parse_from([
            "cost-navigator",
            "search",
            "--data-dir",
            "/tmp/nav",
            "--drg",
            "470",
            "--zip",
            "10001",
            "--radius-km",
            "40",
        ])
        .unwrap();
        let Command::Search(s) = args.cmd else {
            panic!("expected search");
        };
        assert_eq!(s.data_dir, "/tmp/nav");
        assert_eq!(s.drg.as_deref(), Some("470"));
        assert_eq!(s.radius_km, Some(40.0));
        assert_eq!(s.limit, None);
    }

    #[test]
    fn ask_selects_assistant() {
        let args = Args::try_parse_from([
            "cost-navigator",
            "ask",
            "--assistant",
            "ollama",
            "cheapest knee replacement near 10001?",
        ])
        .unwrap();
        let Command::Ask(a) = args.cmd else {
            panic!("expected ask");
        };
        assert_eq!(a.assistant.assistant, AssistantKind::Ollama);
        assert_eq!(a.question, "cheapest knee replacement near 10001?");
        assert_eq!(a.assistant.assistant_timeout_ms, 10_000);
    }

    #[test]
    fn load_requires_a_csv() {
        assert!(Args::try_parse_from(["cost-navigator", "load"]).is_err());
    }
}
