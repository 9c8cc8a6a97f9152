//! fieldlive command-line tool.

use anyhow::{bail, Result};
use fieldlive::{
    Block, BlockTarget, Boundary, FunctionBody, LeafRange, LivenessOptions, Module,
    MultiDefLiveRange, Operator, SsaLiveRange, Terminator, Type, Value,
};
use log::debug;
use std::fmt::Display;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "fieldlive-util", about = "Field-sensitive liveness utility.")]
struct Options {
    #[structopt(short, long)]
    debug: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    #[structopt(name = "list", about = "List the built-in scenarios")]
    List,
    #[structopt(name = "run", about = "Run a scenario and print its boundary")]
    Run {
        #[structopt(help = "Scenario name")]
        name: String,
        #[structopt(long, help = "Fail on projections the leaf model cannot interpret")]
        strict: bool,
    },
}

struct Scenario {
    name: &'static str,
    about: &'static str,
    run: fn(&LivenessOptions) -> Result<()>,
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "partial-consume",
        about: "consume one field of a two-field struct",
        run: partial_consume,
    },
    Scenario {
        name: "deinit",
        about: "consume both fields of a struct with a deinit",
        run: deinit,
    },
    Scenario {
        name: "enum-layout",
        about: "payload ranges of a two-case enum",
        run: enum_layout,
    },
    Scenario {
        name: "pass-through",
        about: "value live through a block with no uses",
        run: pass_through,
    },
    Scenario {
        name: "boundary-edge",
        about: "value live out of entry but dead on one successor",
        run: boundary_edge,
    },
    Scenario {
        name: "interleaved-defs",
        about: "fields of a stack slot initialized and destroyed in turn",
        run: interleaved_defs,
    },
];

fn main() -> Result<()> {
    let opts = Options::from_args();

    let mut logger = env_logger::Builder::from_default_env();
    if opts.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    let _ = logger.try_init();

    match opts.command {
        Command::List => {
            for scenario in SCENARIOS {
                println!("{:<18} {}", scenario.name, scenario.about);
            }
        }
        Command::Run { name, strict } => {
            let scenario = match SCENARIOS.iter().find(|s| s.name == name) {
                Some(scenario) => scenario,
                None => bail!("Unknown scenario '{}'; try `list`", name),
            };
            let options = LivenessOptions {
                strict_projections: strict,
                ..LivenessOptions::default()
            };
            debug!("Running scenario {} with {:?}", scenario.name, options);
            (scenario.run)(&options)?;
        }
    }

    Ok(())
}

fn report(module: &Module, body: &FunctionBody, liveness: &dyn Display, boundary: &Boundary) {
    println!("{}", body.display("", Some(module)));
    println!("liveness:");
    print!("{}", liveness);
    println!("boundary:");
    print!("{}", boundary);
}

fn apply(
    body: &mut FunctionBody,
    block: Block,
    callee: &str,
    args: Vec<Value>,
    tys: Vec<Type>,
) -> Value {
    body.add_inst(
        block,
        Operator::Apply {
            callee: callee.to_owned(),
        },
        args,
        tys,
    )
}

fn br(block: Block) -> Terminator {
    Terminator::Br {
        target: BlockTarget {
            block,
            args: vec![],
        },
    }
}

fn ret() -> Terminator {
    Terminator::Return { values: vec![] }
}

fn value_range(
    module: &Module,
    body: &FunctionBody,
    derived: Value,
    root: Value,
    options: &LivenessOptions,
) -> Result<LeafRange> {
    match LeafRange::for_value(module, body, derived, root, options)? {
        Some(range) => Ok(range),
        None => bail!("No leaf range for {} in {}", derived, root),
    }
}

fn partial_consume(options: &LivenessOptions) -> Result<()> {
    let mut module = Module::empty();
    let int = module.scalar("Int");
    let pair = module.structure("Pair", vec![("a", int), ("b", int)], false);

    let mut body = FunctionBody::new();
    let entry = body.entry;
    let value = apply(&mut body, entry, "make_pair", vec![], vec![pair]);
    let field = body.add_inst(
        entry,
        Operator::StructExtract { field: 0 },
        vec![value],
        vec![int],
    );
    let consume = body.add_inst(entry, Operator::DestroyValue, vec![field], vec![]);
    body.set_terminator(entry, ret());
    body.validate()?;

    let field_range = value_range(&module, &body, field, value, options)?;
    let mut range = SsaLiveRange::new(&module, &body, pair, options.clone());
    range.initialize_def(value, LeafRange::for_type(&module, pair));
    range.update_for_use(consume, field_range, true);
    report(&module, &body, &range, &range.compute_boundary());
    Ok(())
}

fn deinit(options: &LivenessOptions) -> Result<()> {
    let mut module = Module::empty();
    let int = module.scalar("Int");
    let handle = module.structure("Handle", vec![("fd", int), ("flags", int)], true);

    let mut body = FunctionBody::new();
    let entry = body.entry;
    let value = apply(&mut body, entry, "open", vec![], vec![handle]);
    let fd = body.add_inst(
        entry,
        Operator::StructExtract { field: 0 },
        vec![value],
        vec![int],
    );
    let close = apply(&mut body, entry, "close", vec![fd], vec![]);
    let flags = body.add_inst(
        entry,
        Operator::StructExtract { field: 1 },
        vec![value],
        vec![int],
    );
    let discard = body.add_inst(entry, Operator::DestroyValue, vec![flags], vec![]);
    body.set_terminator(entry, ret());
    body.validate()?;

    let fd_range = value_range(&module, &body, fd, value, options)?;
    let flags_range = value_range(&module, &body, flags, value, options)?;
    let mut range = SsaLiveRange::new(&module, &body, handle, options.clone());
    range.initialize_def(value, LeafRange::for_type(&module, handle));
    range.update_for_use(close, fd_range, true);
    range.update_for_use(discard, flags_range, true);
    report(&module, &body, &range, &range.compute_boundary());
    Ok(())
}

fn enum_layout(options: &LivenessOptions) -> Result<()> {
    let mut module = Module::empty();
    let int = module.scalar("Int");
    let triple = module.tuple(vec![int, int, int]);
    let either = module.enumeration("Either", vec![("one", Some(int)), ("three", Some(triple))]);

    let mut body = FunctionBody::new();
    let entry = body.entry;
    let value = apply(&mut body, entry, "make_either", vec![], vec![either]);
    let one = body.add_inst(
        entry,
        Operator::UncheckedEnumData { case: 0 },
        vec![value],
        vec![int],
    );
    let three = body.add_inst(
        entry,
        Operator::UncheckedEnumData { case: 1 },
        vec![value],
        vec![triple],
    );
    body.set_terminator(entry, ret());
    body.validate()?;

    println!("{}", body.display("", Some(&module)));
    let leaves = LeafRange::for_type(&module, either);
    println!("leaves of {}: {}", value, leaves);
    for payload in [one, three] {
        let payload_range = value_range(&module, &body, payload, value, options)?;
        println!("{}: {}", payload, payload_range);
    }
    Ok(())
}

fn pass_through(options: &LivenessOptions) -> Result<()> {
    let mut module = Module::empty();
    let int = module.scalar("Int");

    let mut body = FunctionBody::new();
    let entry = body.entry;
    let mid = body.add_block();
    let exit = body.add_block();
    let value = apply(&mut body, entry, "make", vec![], vec![int]);
    body.set_terminator(entry, br(mid));
    body.set_terminator(mid, br(exit));
    let consume = body.add_inst(exit, Operator::DestroyValue, vec![value], vec![]);
    body.set_terminator(exit, ret());
    body.validate()?;

    let mut range = SsaLiveRange::new(&module, &body, int, options.clone());
    range.initialize_def(value, LeafRange::single(0));
    range.update_for_use(consume, LeafRange::single(0), true);
    report(&module, &body, &range, &range.compute_boundary());
    Ok(())
}

fn boundary_edge(options: &LivenessOptions) -> Result<()> {
    let mut module = Module::empty();
    let int = module.scalar("Int");

    let mut body = FunctionBody::new();
    let entry = body.entry;
    let cond = body.add_blockparam(entry, int);
    let used = body.add_block();
    let unused = body.add_block();
    let value = apply(&mut body, entry, "make", vec![], vec![int]);
    body.set_terminator(
        entry,
        Terminator::CondBr {
            cond,
            if_true: BlockTarget {
                block: used,
                args: vec![],
            },
            if_false: BlockTarget {
                block: unused,
                args: vec![],
            },
        },
    );
    let consume = body.add_inst(used, Operator::DestroyValue, vec![value], vec![]);
    body.set_terminator(used, ret());
    apply(&mut body, unused, "unrelated", vec![], vec![int]);
    body.set_terminator(unused, ret());
    body.validate()?;

    let mut range = SsaLiveRange::new(&module, &body, int, options.clone());
    range.initialize_def(value, LeafRange::single(0));
    range.update_for_use(consume, LeafRange::single(0), true);
    report(&module, &body, &range, &range.compute_boundary());
    Ok(())
}

fn interleaved_defs(options: &LivenessOptions) -> Result<()> {
    let mut module = Module::empty();
    let int = module.scalar("Int");
    let pair = module.structure("Pair", vec![("a", int), ("b", int)], false);

    let mut body = FunctionBody::new();
    let entry = body.entry;
    let slot = body.add_inst(entry, Operator::AllocStack, vec![], vec![pair]);
    let a = apply(&mut body, entry, "make", vec![], vec![int]);
    let a_addr = body.add_inst(
        entry,
        Operator::StructElementAddr { field: 0 },
        vec![slot],
        vec![int],
    );
    let init_a = body.add_inst(entry, Operator::Store, vec![a, a_addr], vec![]);
    let destroy_a = body.add_inst(entry, Operator::DestroyAddr, vec![a_addr], vec![]);
    let b = apply(&mut body, entry, "make", vec![], vec![int]);
    let b_addr = body.add_inst(
        entry,
        Operator::StructElementAddr { field: 1 },
        vec![slot],
        vec![int],
    );
    let init_b = body.add_inst(entry, Operator::Store, vec![b, b_addr], vec![]);
    let destroy_b = body.add_inst(entry, Operator::DestroyAddr, vec![b_addr], vec![]);
    body.set_terminator(entry, ret());
    body.validate()?;

    let address_range = |addr: Value| -> Result<LeafRange> {
        match LeafRange::for_address(&module, &body, addr, slot, options)? {
            Some(range) => Ok(range),
            None => bail!("No leaf range for {} in {}", addr, slot),
        }
    };
    let a_range = address_range(a_addr)?;
    let b_range = address_range(b_addr)?;

    let mut range = MultiDefLiveRange::new(&module, &body, pair, options.clone());
    range.initialize_def_inst(init_a, a_range);
    range.initialize_def_inst(init_b, b_range);
    range.finished_initialization_of_defs();
    range.update_for_use(destroy_a, a_range, true);
    range.update_for_use(destroy_b, b_range, true);
    report(&module, &body, &range, &range.compute_boundary());

    let mut earlier = vec![];
    let reached_def = range.find_earlier_consuming_use(destroy_b, b_range.start, |user| {
        earlier.push(user);
        true
    });
    println!(
        "earlier consuming uses of bit {} before {}: {:?} (reached def: {})",
        b_range.start, destroy_b, earlier, reached_def
    );
    Ok(())
}
