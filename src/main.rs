use rsync_mapper::{
    args::get_env_args,
    batch,
    console::StdConsole,
    interactive::{self, FAREWELL},
    mapping::MappingModel,
    readiness::{Readiness, ZfsPool},
    rsync::Rsync,
    runner::ShellRunner,
    Context, Result,
};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = get_env_args()?;
    init_logging(args.log_level());

    let model = MappingModel::load_user_path(&args.map)?;
    if model.is_empty() {
        warn!(map = %args.map, "file map has no links, nothing to do");
    } else {
        info!(map = %args.map, links = model.len(), "file map loaded");
    }

    let mut runner = ShellRunner::new();
    let mut console = StdConsole::stdio();
    let mut rsync = Rsync::new(&mut runner, &mut console)
        .program(&args.rsync)
        .backoff_max(Duration::from_secs(args.backoff_max));

    let mut pool = args
        .pool
        .as_deref()
        .map(|name| ZfsPool::new(name, ShellRunner::new()));
    let hook = pool.as_mut().map(|p| p as &mut dyn Readiness);

    if args.interactive {
        ctrlc::set_handler(|| {
            println!("\n{FAREWELL}");
            std::process::exit(0);
        })
        .context("Failed to set Ctrl-C handler")?;

        interactive::run(&mut rsync, &model, hook)
    } else {
        batch::run(&mut rsync, &model, &args.batch_flags(), hook)
    }
}
