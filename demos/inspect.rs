//! Prints the contents of a container file and summarizes its trees.
//!
//! ```text
//! cargo run --example inspect -- events.root [--json] [--threads N]
//! ```
//!
//! Set `RUST_LOG=rootio=debug` to see what the reader does.

use anyhow::{bail, Context};
use rootio::{Array, Branch, Container, ReadOptions};

struct Args {
    path: String,
    json: bool,
    threads: usize,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut path = None;
    let mut json = false;
    let mut threads = 1;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => json = true,
            "--threads" => {
                let value = args.next().context("--threads needs a value")?;
                threads = value.parse().with_context(|| format!("bad thread count {:?}", value))?;
            }
            _ if path.is_none() => path = Some(arg),
            _ => bail!("unexpected argument {:?}", arg),
        }
    }
    let path = path.context("usage: inspect <file> [--json] [--threads N]")?;
    Ok(Args { path, json, threads })
}

fn preview(array: &Array) -> String {
    if let Some(values) = array.to_f64_vec() {
        let head: Vec<String> = values.iter().take(5).map(|v| format!("{}", v)).collect();
        return format!("[{}{}]", head.join(", "), if values.len() > 5 { ", ..." } else { "" });
    }
    if let Some(jagged) = array.as_jagged() {
        let sizes: Vec<String> = jagged.sizes().iter().take(5).map(|s| s.to_string()).collect();
        return format!("jagged, row sizes [{}{}]", sizes.join(", "), if jagged.len() > 5 { ", ..." } else { "" });
    }
    format!("{} items", array.len())
}

fn summarize(branch: &Branch, depth: usize) {
    let indent = "  ".repeat(depth + 1);
    let interp = match branch.interpretation() {
        Ok(interp) => interp.to_string(),
        Err(e) => format!("({})", e),
    };
    println!(
        "{}{} [{}] {} entries in {} baskets, {}",
        indent,
        branch.name(),
        branch.record_class(),
        branch.entries(),
        branch.num_baskets(),
        interp
    );
    if branch.interpretation().is_ok() {
        match branch.array_range(0, 5) {
            Ok(array) => println!("{}  first entries: {}", indent, preview(&array)),
            Err(e) => println!("{}  unreadable: {}", indent, e),
        }
    }
    for sub in branch.branches() {
        summarize(sub, depth + 1);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = parse_args()?;

    let options = ReadOptions::default().decode_threads(args.threads);
    let file = Container::open(&args.path, options).with_context(|| format!("opening {}", args.path))?;

    if args.json {
        let summary = serde_json::json!({
            "header": file.header(),
            "keys": file.keys(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{} ({}), format {}", file.name(), file.title(), file.header().format_version());
    println!("compression: {:?}", file.compression());

    for (name, class) in file.root().all_contents()? {
        println!("{:<40} {}", name, class);
        if class != "TTree" {
            continue;
        }
        let tree = file.tree(&name).with_context(|| format!("reading tree {}", name))?;
        for branch in tree.branches() {
            summarize(branch, 0);
        }
    }

    let stats = file.cache_stats();
    println!("basket cache: {} lookups, {:.0}% hits", stats.lookups, stats.hit_rate() * 100.0);
    Ok(())
}
