//! CLI interface for tocaro-export - export Tocaro groups and messages as JSON.

use std::env;
use std::fs::OpenOptions;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use env_logger::fmt::WriteStyle;
use log::{LevelFilter, debug};
use tocaro_core::export::GROUPS_FILE;
use tocaro_core::paths::write_default_config;
use tocaro_core::{
    AppConfig, AppPaths, CoreError, Exporter, MessageSelection, TocaroClient, generate_schema,
    write_generated_files,
};

const APP_NAME: &str = "tocaro-export";

/// Repository URL used as the schema `$id`.
const REPO_URL: &str = "https://github.com/byteowlz/tocaro-export";

fn main() -> anyhow::Result<()> {
    try_main()
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("resolved paths: {:#?}", ctx.paths);

    match cli.command {
        Command::Export(cmd) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(handle_export(&ctx, cmd))
        }
        Command::Groups(cmd) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(handle_groups(&ctx, cmd))
        }
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => {
            handle_completions(shell);
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "tocaro-export",
    author,
    version,
    about = "Export Tocaro groups and message history as JSON",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

/// Common CLI options shared across all subcommands.
#[derive(Debug, Clone, Args)]
pub struct CommonOpts {
    /// Override the config file path.
    #[arg(short = 'c', long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
    /// Reduce output to only errors.
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    pub quiet: bool,
    /// Increase logging verbosity (stackable).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,
    /// Enable trace logging.
    #[arg(long, global = true)]
    pub trace: bool,
    /// Output machine-readable JSON.
    #[arg(long, global = true)]
    pub json: bool,
    /// Disable ANSI colors in output.
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    pub no_color: bool,
    /// Control color output.
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    pub color: ColorOption,
    /// Do not change anything on disk.
    #[arg(long = "dry-run", global = true)]
    pub dry_run: bool,
    /// Assume "yes" for interactive prompts.
    #[arg(short = 'y', long = "yes", global = true)]
    pub assume_yes: bool,
}

/// Color output mode.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorOption {
    /// Detect terminal capabilities automatically.
    Auto,
    /// Always emit ANSI color codes.
    Always,
    /// Never emit ANSI color codes.
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Export message history of one, some, or all groups.
    Export(ExportCommand),
    /// Export the group list only (groups.json).
    Groups(GroupsCommand),
    /// Create config directories and default files.
    Init(InitCommand),
    /// Inspect and manage configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ExportCommand {
    #[command(flatten)]
    target: ExportTarget,
    /// Also write groups.json.
    #[arg(long)]
    with_groups: bool,
    /// Output directory (overrides output.path).
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
struct ExportTarget {
    /// Export messages from all groups and talks.
    #[arg(short, long)]
    all: bool,
    /// Export messages from a single group code.
    #[arg(short, long, value_name = "CODE")]
    group_id: Option<String>,
    /// Export messages from groups whose name contains TEXT.
    #[arg(short, long, value_name = "TEXT")]
    includes: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct GroupsCommand {
    /// Output directory (overrides output.path).
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Args)]
struct InitCommand {
    /// Recreate configuration even if it already exists.
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration (password masked).
    Show,
    /// Print the resolved config file path.
    Path,
    /// Print all resolved paths.
    Paths,
    /// Print the JSON schema.
    Schema,
    /// Regenerate the default configuration file.
    Reset,
    /// Write config.schema.json and an example config.toml to a directory.
    Generate {
        /// Target directory.
        dir: PathBuf,
    },
}

// ─── Runtime ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let paths = AppPaths::discover(common.config.as_deref())?;
        let config = AppConfig::load(&paths, common.dry_run)?;
        let ctx = Self {
            common,
            paths,
            config,
        };
        ctx.ensure_directories()?;
        Ok(ctx)
    }

    fn init_logging(&self) -> Result<()> {
        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
        builder.filter_level(self.effective_log_level());

        if let Some(ref file) = self.config.logging.file {
            let target = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .with_context(|| format!("opening log file {file}"))?;
            builder.target(env_logger::Target::Pipe(Box::new(target)));
            builder.write_style(WriteStyle::Never);
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            if disable_color {
                builder.write_style(WriteStyle::Never);
            } else if force_color {
                builder.write_style(WriteStyle::Always);
            } else {
                builder.write_style(WriteStyle::Auto);
            }
        }

        builder.try_init().or_else(|err| {
            if self.common.verbose > 0 {
                eprintln!("logger already initialized: {err}");
            }
            Ok(())
        })
    }

    /// CLI flags win; without any, `logging.level` from the config applies.
    const fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => self.config.logging.level.as_level_filter(),
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn ensure_directories(&self) -> Result<()> {
        if self.common.dry_run {
            self.paths.log_dry_run();
            return Ok(());
        }
        self.paths.ensure_directories()
    }

    fn output_dir(&self, cli_override: Option<&Path>) -> Result<PathBuf> {
        match cli_override {
            Some(dir) => Ok(dir.to_path_buf()),
            None => self.config.output_dir(&self.paths),
        }
    }

    /// Build an exporter and sign it in with the configured account.
    async fn signed_in_exporter(&self, with_groups: bool) -> Result<Exporter> {
        let (email, password) = self.config.credentials()?;
        let client = TocaroClient::new(self.config.session_config())?;
        let mut options = self.config.exporter_options();
        options.with_groups |= with_groups;
        let mut exporter = Exporter::new(client, options);

        log::info!("connecting to {}", self.config.tocaro.base_url);
        if let Err(e) = exporter.sign_in(email, password).await {
            if matches!(
                e,
                CoreError::CsrfTokenNotFound(_)
                    | CoreError::SignIn(_)
                    | CoreError::AuthTokenNotFound(_)
            ) {
                log::error!("sign-in was unsuccessful, check the error message: {e}");
            }
            return Err(e).context("signing in to Tocaro");
        }
        Ok(exporter)
    }
}

// ─── Handlers ────────────────────────────────────────────────────────

async fn handle_export(ctx: &RuntimeContext, cmd: ExportCommand) -> Result<()> {
    let dir = ctx.output_dir(cmd.output.as_deref())?;
    let selection = message_selection(&cmd.target, &ctx.config.export.includes);
    let exporter = ctx.signed_in_exporter(cmd.with_groups).await?;

    if ctx.common.dry_run {
        let ids = match selection {
            MessageSelection::Group(id) => vec![id],
            MessageSelection::Includes(ref text) => {
                let groups = exporter.get_groups().await?;
                Exporter::gather_group_ids(&groups, text, &exporter.options().excludes)
            }
            MessageSelection::All => {
                let groups = exporter.get_groups().await?;
                Exporter::gather_group_ids(&groups, "", &exporter.options().excludes)
            }
        };
        println!(
            "dry-run: would export {} group(s) to {}: {}",
            ids.len(),
            dir.display(),
            ids.join(", ")
        );
        return Ok(());
    }

    let summary = exporter.export_messages(&dir, &selection).await?;

    if ctx.common.json {
        let failed: Vec<serde_json::Value> = summary
            .failed
            .iter()
            .map(|f| serde_json::json!({ "group_id": f.group_id, "error": f.error }))
            .collect();
        let report = serde_json::json!({
            "output": dir,
            "written": summary.written,
            "messages": summary.messages,
            "failed": failed,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !ctx.common.quiet {
        println!(
            "Exported {} messages into {} file(s) under {}.",
            summary.messages,
            summary.written.len(),
            dir.display()
        );
        for failure in &summary.failed {
            eprintln!("  failed: {} ({})", failure.group_id, failure.error);
        }
    }

    if summary.failed.is_empty() {
        log::info!("processing finished successfully");
        Ok(())
    } else {
        Err(anyhow!("{} group(s) failed to export", summary.failed.len()))
    }
}

async fn handle_groups(ctx: &RuntimeContext, cmd: GroupsCommand) -> Result<()> {
    let dir = ctx.output_dir(cmd.output.as_deref())?;
    let exporter = ctx.signed_in_exporter(false).await?;

    let groups = if ctx.common.dry_run {
        exporter.get_groups().await?
    } else {
        exporter.export_groups(&dir).await?
    };

    if ctx.common.json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }
    if ctx.common.quiet {
        return Ok(());
    }

    for group in &groups {
        println!(
            "  {:>6}  {:<28}  {}",
            group.kind().as_str(),
            group.code(),
            group.name()
        );
    }
    if ctx.common.dry_run {
        println!("dry-run: would write {} groups to {}", groups.len(), dir.display());
    } else {
        println!("Wrote {} groups to {}.", groups.len(), dir.join(GROUPS_FILE).display());
    }
    Ok(())
}

/// `--all` still honours `export.includes` from the config file.
fn message_selection(target: &ExportTarget, config_includes: &str) -> MessageSelection {
    match (&target.group_id, &target.includes) {
        (Some(id), _) => MessageSelection::Group(id.clone()),
        (None, Some(text)) => MessageSelection::Includes(text.clone()),
        (None, None) if target.all && !config_includes.is_empty() => {
            log::info!("limiting export to groups containing '{config_includes}' (export.includes)");
            MessageSelection::Includes(config_includes.to_string())
        }
        (None, None) => MessageSelection::All,
    }
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.paths.config_file.exists() && !(cmd.force || ctx.common.assume_yes) {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            ctx.paths.config_file.display()
        ));
    }
    if ctx.common.dry_run {
        log::info!(
            "dry-run: would write default config to {}",
            ctx.paths.config_file.display()
        );
        return Ok(());
    }
    write_default_config(&ctx.paths.config_file)
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let shown = ctx.config.redacted();
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&shown).context("serializing config to JSON")?
                );
            } else {
                println!(
                    "{}",
                    toml::to_string_pretty(&shown).context("serializing config to TOML")?
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
        ConfigCommand::Paths => {
            let output_dir = ctx.config.output_dir(&ctx.paths)?;
            if ctx.common.json {
                let paths = serde_json::json!({
                    "config": ctx.paths.config_file,
                    "data": ctx.paths.data_dir,
                    "output": output_dir,
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&paths).context("serializing paths to JSON")?
                );
            } else {
                println!("config: {}", ctx.paths.config_file.display());
                println!("data:   {}", ctx.paths.data_dir.display());
                println!("output: {}", output_dir.display());
            }
            Ok(())
        }
        ConfigCommand::Schema => {
            println!("{}", generate_schema(APP_NAME, REPO_URL)?);
            Ok(())
        }
        ConfigCommand::Reset => {
            if ctx.common.dry_run {
                log::info!(
                    "dry-run: would reset config at {}",
                    ctx.paths.config_file.display()
                );
                return Ok(());
            }
            write_default_config(&ctx.paths.config_file)
        }
        ConfigCommand::Generate { dir } => {
            if ctx.common.dry_run {
                log::info!("dry-run: would write schema and example config to {}", dir.display());
                return Ok(());
            }
            write_generated_files(&dir, APP_NAME, REPO_URL)?;
            println!("Generated config.schema.json and config.toml in {}", dir.display());
            Ok(())
        }
    }
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
}
