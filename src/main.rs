use std::error::Error;
use std::path::PathBuf;

use tracing::info;

use cellnet::cell::Cell;
use cellnet::network::SimulationNetwork;
use cellnet::observer::{NetworkAdapter, NetworkSnapshot};
use cellnet::params::SimulationParameters;

const DEFAULT_TICKS: u64 = 200;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(cmd) = args.first() else {
        print_help();
        return Ok(());
    };

    match cmd.as_str() {
        "--help" | "-h" | "help" => print_help(),
        "demo" => {
            let opts = Options::parse(&args[1..])?;
            run_demo(&opts)?;
        }
        "run" => {
            let opts = Options::parse(&args[1..])?;
            let path = opts.file.clone().ok_or("run: missing FILE")?;
            run_saved(path, &opts)?;
        }
        "inspect" => {
            let opts = Options::parse(&args[1..])?;
            let path = opts.file.clone().ok_or("inspect: missing FILE")?;
            let net = SimulationNetwork::load_from_path(&path)?;
            print_snapshot(&NetworkAdapter::new(&net).snapshot());
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            std::process::exit(2);
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Options {
    file: Option<PathBuf>,
    ticks: Option<u64>,
    params: Option<PathBuf>,
    save: Option<PathBuf>,
}

impl Options {
    fn parse(args: &[String]) -> Result<Self, Box<dyn Error>> {
        let mut opts = Options::default();
        let mut it = args.iter();
        while let Some(arg) = it.next() {
            let mut value = |flag: &str| {
                it.next()
                    .cloned()
                    .ok_or_else(|| format!("{flag} needs a value"))
            };
            match arg.as_str() {
                "--ticks" => opts.ticks = Some(value("--ticks")?.parse()?),
                "--params" => opts.params = Some(value("--params")?.into()),
                "--save" => opts.save = Some(value("--save")?.into()),
                flag if flag.starts_with("--") => {
                    return Err(format!("unknown option {flag}").into());
                }
                file if opts.file.is_none() => opts.file = Some(file.into()),
                extra => return Err(format!("unexpected argument {extra}").into()),
            }
        }
        Ok(opts)
    }
}

fn print_help() {
    println!("cellnet (cell-graph automaton)");
    println!("usage:");
    println!("  cellnet demo [--ticks N] [--save FILE]");
    println!("  cellnet run FILE [--ticks N] [--params PARAMS.json] [--save OUT]");
    println!("  cellnet inspect FILE");
    println!("  cellnet help");
}

/// Two oscillators at different rates drive a node through learning links;
/// a gated inhibitory link from the node damps a second node.
fn build_demo() -> cellnet::Result<SimulationNetwork> {
    let net = SimulationNetwork::new(
        SimulationParameters::default()
            .with_link_learn_rate(0.2)
            .with_learn_time(10.0),
    )?;

    let fast = net.add_node(Cell::oscillator(3, 1, 0))?;
    let slow = net.add_node(Cell::oscillator(7, 2, 4))?;
    let hub = net.add_node(Cell::node(0.8, 0.6))?;
    let follower = net.add_node(Cell::node(0.3, 0.4))?;
    let drive = net.add_node(Cell::node(0.0, 0.0).with_output(1.0).with_frozen(true))?;

    for osc in [fast, slow] {
        let link = net.add_node(Cell::excitatory_link(Cell::DEFAULT_EXCITATORY_WEIGHT))?;
        net.add_edge(link, osc)?;
        net.add_edge(hub, link)?;
    }

    let gate = net.add_node(Cell::threshold_inhibitory_link(-0.8, 0.5))?;
    net.add_edge(gate, hub)?;
    net.add_edge(follower, gate)?;

    let feed = net.add_node(Cell::excitatory_link(0.6))?;
    net.add_edge(feed, drive)?;
    net.add_edge(follower, feed)?;

    Ok(net)
}

fn advance(net: &SimulationNetwork, ticks: u64) -> cellnet::Result<()> {
    for _ in 0..ticks {
        net.step()?;
    }
    info!(ticks, total = net.tick_count(), "stepping done");
    Ok(())
}

fn run_demo(opts: &Options) -> Result<(), Box<dyn Error>> {
    let net = build_demo()?;
    advance(&net, opts.ticks.unwrap_or(DEFAULT_TICKS))?;
    print_snapshot(&NetworkAdapter::new(&net).snapshot());
    if let Some(out) = &opts.save {
        net.save_to_path(out)?;
        println!("saved: {}", out.display());
    }
    Ok(())
}

fn run_saved(path: PathBuf, opts: &Options) -> Result<(), Box<dyn Error>> {
    let net = SimulationNetwork::load_from_path(&path)?;
    if let Some(p) = &opts.params {
        let text = std::fs::read_to_string(p)?;
        net.set_parameters(SimulationParameters::from_json(&text)?)?;
    }
    advance(&net, opts.ticks.unwrap_or(DEFAULT_TICKS))?;
    print_snapshot(&NetworkAdapter::new(&net).snapshot());

    let out = opts.save.clone().unwrap_or(path);
    net.save_to_path(&out)?;
    println!("saved: {}", out.display());
    Ok(())
}

fn print_snapshot(snap: &NetworkSnapshot) {
    let d = &snap.diagnostics;
    println!(
        "ticks={} cells={} edges={} slots={} tier={:?}",
        snap.ticks, d.cell_count, d.edge_count, d.slot_count, d.execution_tier
    );
    println!(
        "params: decay={} link_learn={} node_learn={} node_forget={} learn_time={}",
        snap.params.decay,
        snap.params.link_learn_rate,
        snap.params.node_learn_rate,
        snap.params.node_forget_rate,
        snap.params.learn_time
    );
    let k = &snap.kinds;
    println!(
        "kinds: node={} excite={} inhibit={} gate={} osc={}",
        k.nodes, k.excitatory_links, k.inhibitory_links, k.threshold_inhibitory_links, k.oscillators
    );
    println!("mean output={:.4}", snap.mean_output());
    for c in &snap.cells {
        println!(
            "  {:>8} {:<26} out={:+.4} avg={:+.4}{}",
            c.index.to_string(),
            c.tag.name(),
            c.output,
            c.running_average,
            if c.frozen { " frozen" } else { "" }
        );
    }
}
