use std::error::Error;
use std::io::{self, BufRead, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;

use atty::Stream;
use clap::{Parser, Subcommand};
use oraculo_rs::{Idea, Phrasing, Store, generate, generate_batch, validate_keyword};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tracing_subscriber::EnvFilter;

const EXIT_WORDS: &[&str] = &["sair", "exit", "quit"];

#[derive(Parser, Debug)]
#[command(name = "oraculo-rs", about = "Generate hallucinated ideas from keywords", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding `temas.json` and `conectores.json`.
    #[arg(long, global = true, env = "ORACULO_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Sentence template language (`pt` or `en`).
    #[arg(long, global = true, env = "ORACULO_PHRASING", default_value_t = Phrasing::Portuguese)]
    phrasing: Phrasing,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate ideas for a keyword.
    Generate {
        /// Keyword words; joined with single spaces.
        #[arg(required = true)]
        keyword: Vec<String>,
        /// Number of ideas to generate.
        #[arg(short, long, default_value_t = NonZeroUsize::MIN)]
        count: NonZeroUsize,
        /// Seed for reproducible output.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Show which theme a text resolves to.
    Match {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// List themes with keyword counts.
    Themes,
    /// List connector phrases.
    Connectors {
        /// Restrict the listing to one category.
        #[arg(long)]
        category: Option<String>,
    },
    /// Prompt for keywords until `sair`, `exit`, `quit` or an empty line.
    Interactive,
    /// Run the HTTP API.
    #[cfg(feature = "web")]
    Serve {
        /// Socket address to bind.
        #[arg(long, env = "ORACULO_ADDR", default_value = "127.0.0.1:8000")]
        addr: std::net::SocketAddr,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let store = Store::load_or_fallback(&cli.data_dir);
    match cli.command {
        Command::Generate {
            keyword,
            count,
            seed,
        } => handle_generate(&store, &keyword.join(" "), count, seed, cli.phrasing, cli.json),
        Command::Match { text } => handle_match(&store, &text.join(" "), cli.json),
        Command::Themes => handle_themes(&store, cli.json),
        Command::Connectors { category } => handle_connectors(&store, category, cli.json),
        Command::Interactive => handle_interactive(&store, cli.phrasing, cli.json),
        #[cfg(feature = "web")]
        Command::Serve { addr } => handle_serve(store, addr, cli.phrasing),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "oraculo_rs=debug,tower_http=debug"
    } else {
        "oraculo_rs=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn handle_generate(
    store: &Store,
    keyword: &str,
    count: NonZeroUsize,
    seed: Option<u64>,
    phrasing: Phrasing,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let keyword = validate_keyword(keyword)?;
    let ideas = generate_batch(keyword, store, phrasing, count.get(), seed)
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    if as_json {
        let payload = if ideas.len() == 1 {
            serde_json::to_value(&ideas[0])?
        } else {
            json!({ "keyword": keyword, "count": ideas.len(), "results": ideas })
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for idea in &ideas {
            print_idea(idea);
        }
    }
    Ok(())
}

fn handle_match(store: &Store, text: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let theme = store.match_theme(text);
    if as_json {
        let payload = json!({ "input": text, "theme": theme });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        match theme {
            Some(theme) => println!("{text:?} -> {theme}"),
            None => println!("{text:?} -> no match (a random theme would be used)"),
        }
    }
    Ok(())
}

fn handle_themes(store: &Store, as_json: bool) -> Result<(), Box<dyn Error>> {
    let stats = store.stats();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    let width = stats
        .themes
        .iter()
        .map(|theme| theme.name.chars().count())
        .max()
        .unwrap_or(5)
        .max("THEME".len());
    println!("{:<width$}  {:>8}  {:>6}  {}", "THEME", "KEYWORDS", "WEIGHT", "DESCRIPTION", width = width);
    println!("{:-<width$}  {:->8}  {:->6}  {}", "", "", "", "-----------", width = width);
    for theme in &stats.themes {
        println!(
            "{:<width$}  {:>8}  {:>6.2}  {}",
            theme.name, theme.keyword_count, theme.weight, theme.description,
            width = width
        );
    }
    println!(
        "\n{} themes, {} connectors ({})",
        stats.total_themes,
        stats.total_connectors,
        store.origin()
    );
    Ok(())
}

fn handle_connectors(
    store: &Store,
    category: Option<String>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let rows: Vec<(&str, &str)> = match category.as_deref() {
        Some(name) => {
            let phrases = store.connectors_in(name);
            if phrases.is_empty() {
                return Err(format!("No connector category named {name:?}").into());
            }
            phrases.iter().map(|phrase| (name, phrase.as_str())).collect()
        }
        None => store
            .categories()
            .iter()
            .flat_map(|cat| cat.phrases.iter().map(move |p| (cat.name.as_str(), p.as_str())))
            .collect(),
    };

    if as_json {
        let payload: Vec<_> = rows
            .iter()
            .map(|(category, phrase)| json!({ "category": category, "phrase": phrase }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        let width = rows
            .iter()
            .map(|(category, _)| category.len())
            .max()
            .unwrap_or(8)
            .max("CATEGORY".len());
        println!("{:<width$}  {}", "CATEGORY", "PHRASE", width = width);
        println!("{:-<width$}  {}", "", "------", width = width);
        for (category, phrase) in &rows {
            println!("{:<width$}  {}", category, phrase, width = width);
        }
    }
    Ok(())
}

fn handle_interactive(store: &Store, phrasing: Phrasing, as_json: bool) -> Result<(), Box<dyn Error>> {
    let stats = store.stats();
    if !as_json {
        println!(
            "Oráculo Alucinado: {} themes, {} connectors. Type `sair` to leave.",
            stats.total_themes, stats.total_connectors
        );
    }
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        if !as_json {
            print!("\nkeyword> ");
            io::stdout().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let keyword = line?;
        let keyword = keyword.trim();
        if keyword.is_empty() || EXIT_WORDS.contains(&keyword.to_lowercase().as_str()) {
            break;
        }
        match generate(keyword, store, phrasing) {
            Ok(idea) if as_json => println!("{}", serde_json::to_string(&idea)?),
            Ok(idea) => print_idea(&idea),
            Err(err) => eprintln!("error: {err}"),
        }
    }
    if !as_json {
        println!("\nObrigado por usar o Oráculo Alucinado!");
    }
    Ok(())
}

#[cfg(feature = "web")]
fn handle_serve(
    store: Store,
    addr: std::net::SocketAddr,
    phrasing: Phrasing,
) -> Result<(), Box<dyn Error>> {
    let config = oraculo_rs::web::WebConfig { addr, phrasing };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(oraculo_rs::web::serve(config, store))?;
    Ok(())
}

fn print_idea(idea: &Idea) {
    println!("\nResult for {:?}", idea.requested_input);
    println!("Theme:      {}", idea.identified_theme);
    println!("Distortion: {}", idea.distortion_factor);
    if let Some(block) = markdown_block("Idea", &idea.generated_idea, stdout_is_tty()) {
        print!("{block}");
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn markdown_skin() -> MadSkin {
    MadSkin::default()
}

/// Title line followed by `body`, styled through termimad when `styled`.
fn markdown_block(title: &str, body: &str, styled: bool) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let rendered = if styled {
        let skin = markdown_skin();
        FmtText::from(&skin, &format!("**{trimmed}**"), Some(markdown_width())).to_string()
    } else {
        format!("{trimmed}\n")
    };
    Some(format!("\n{title}:\n{rendered}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_must_be_positive() {
        let zero = Cli::try_parse_from(["oraculo-rs", "generate", "viagem", "--count", "0"]);
        assert!(zero.is_err());

        let cli = Cli::try_parse_from(["oraculo-rs", "generate", "viagem", "rápida", "-c", "3"])
            .unwrap();
        match cli.command {
            Command::Generate { keyword, count, .. } => {
                assert_eq!(keyword.join(" "), "viagem rápida");
                assert_eq!(count.get(), 3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn count_defaults_to_one() {
        let cli = Cli::try_parse_from(["oraculo-rs", "generate", "viagem"]).unwrap();
        assert!(matches!(cli.command, Command::Generate { count, .. } if count.get() == 1));
    }

    #[test]
    fn phrasing_flag_is_global() {
        let cli = Cli::try_parse_from(["oraculo-rs", "themes", "--phrasing", "en"]).unwrap();
        assert_eq!(cli.phrasing, Phrasing::English);
    }

    #[test]
    fn plain_block_puts_title_on_its_own_line() {
        let block = markdown_block("Idea", "  Criar algo.  ", false).unwrap();
        assert_eq!(block, "\nIdea:\nCriar algo.\n");
        assert!(markdown_block("Idea", "   ", false).is_none());
    }
}
