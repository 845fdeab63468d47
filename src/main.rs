use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use log::debug;
use structopt::StructOpt;

use steno::config::{parse_limit, Config};
use steno::error::SolveError;
use steno::message::ConsoleReporter;
use steno::solver::{Solution, Solver};

#[derive(StructOpt, Debug)]
#[structopt(name = "steno", about = "steno-chess puzzle solver cli")]
struct Opt {
    /// Mark vocabulary: C(lassic), E(xtended) or P(GN)
    #[structopt(short, long, default_value = "C")]
    vocabulary: String,

    /// Most positions a frontier may hold; decimal with K/M/B suffix, or MAX
    #[structopt(long, default_value = "1M")]
    max_positions: String,

    /// Cooks kept per position
    #[structopt(long, default_value = "4")]
    max_cooks: String,

    /// Worker threads for the search
    #[structopt(long, default_value = "4")]
    tasks: usize,

    /// Solutions to print (0 for none, otherwise more than 1)
    #[structopt(long, default_value = "10")]
    list: usize,

    /// Print a board with each listed solution
    #[structopt(long)]
    display_positions: bool,

    /// Show synthesised marks and conditions in progress output
    #[structopt(long)]
    show_meta_marks: bool,

    /// Refuse chunk directives and multi-chunk checkpoints
    #[structopt(long)]
    no_chunking: bool,

    /// Starting position: an 8-letter back rank, or the first 3-6 FEN fields
    #[structopt(long, default_value = "")]
    start: String,

    /// Append status lines to this file
    #[structopt(long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Read and write checkpoint blobs here
    #[structopt(long, parse(from_os_str))]
    checkpoint: Option<PathBuf>,

    /// The steno to solve
    steno: Vec<String>,
}

fn main() {
    env_logger::init();

    let opt = Opt::from_args();
    if let Err(error) = run(opt) {
        eprintln!("error: {}", error);
        std::process::exit(1);
    }
}

fn run(opt: Opt) -> Result<(), SolveError> {
    let config = Config {
        vocabulary: opt.vocabulary.parse()?,
        max_positions_to_examine: parse_limit(&opt.max_positions)? as usize,
        max_cooks_to_keep: parse_limit(&opt.max_cooks)? as usize,
        max_solver_tasks: opt.tasks,
        max_solutions_to_list: opt.list,
        display_positions: opt.display_positions,
        show_meta_marks: opt.show_meta_marks,
        allow_chunking: !opt.no_chunking,
        start_fen: opt.start.clone(),
        output_file: opt.output.clone(),
    };

    let reporter = Arc::new(ConsoleReporter::new(config.output_file.as_ref())?);
    let saved = match &opt.checkpoint {
        Some(path) if path.exists() => Some(
            fs::read(path).map_err(|_| SolveError::InvalidFile(path.display().to_string()))?,
        ),
        _ => None,
    };

    let steno_text = opt.steno.join(" ");
    debug!("solving `{}`", steno_text);

    let solver = Solver::new(config.clone(), reporter)?;
    let solution = match solver.solve(&steno_text, saved.as_deref()) {
        Ok(solution) => solution,
        // Aborts were already reported; the frontier is simply gone.
        Err(error) if error.is_abort() => return Ok(()),
        Err(error) => return Err(error),
    };

    if let (Some(path), Some(blob)) = (&opt.checkpoint, &solution.checkpoint) {
        fs::write(path, blob).map_err(|_| SolveError::InvalidFile(path.display().to_string()))?;
    }

    list_solutions(&config, &solution);
    Ok(())
}

fn list_solutions(config: &Config, solution: &Solution) {
    if config.max_solutions_to_list == 0 {
        return;
    }
    let mut keys: Vec<&String> = solution.frontier.keys().collect();
    keys.sort();
    for key in keys.into_iter().take(config.max_solutions_to_list) {
        let position = &solution.frontier[key];
        println!("{}", key);
        let capped = position.move_sets.len() > config.max_cooks_to_keep;
        for (i, move_set) in position.move_sets.iter().enumerate() {
            if capped && i == config.max_cooks_to_keep {
                println!("  ... at least one more cook");
                break;
            }
            println!("  {}", move_set.moves);
        }
        if config.display_positions {
            println!("{}", position.board.to_ascii());
        }
    }
}
