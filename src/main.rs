use anyhow::Context;
use clap::{Parser, Subcommand};
use conditioner_rs::condition::{self, formatter, Expression};
use conditioner_rs::module::ModuleRegistry;
use dotenv::dotenv;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse a condition expression and print its tree
    Check {
        /// The condition, e.g. "media:{(min-width:40em)} and not touch"
        expression: String,
    },
    /// Load a YAML module registry and list its modules
    Registry {
        /// Path to the registry file
        file: String,
    },
}

fn print_tree(expression: &Expression, depth: usize) {
    let indent = "  ".repeat(depth);
    match expression {
        Expression::Leaf(leaf) => println!("{}{}", indent, leaf),
        Expression::And(left, right) => {
            println!("{}AND", indent);
            print_tree(left, depth + 1);
            print_tree(right, depth + 1);
        }
        Expression::Or(left, right) => {
            println!("{}OR", indent);
            print_tree(left, depth + 1);
            print_tree(right, depth + 1);
        }
        Expression::Not(operand) => {
            println!("{}NOT", indent);
            print_tree(operand, depth + 1);
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Check { expression } => {
            let normalized = formatter::normalize(&expression)?;
            log::debug!("Normalized: {}", normalized);

            let tree = condition::parse(&expression)?;
            println!("{}", tree);
            print_tree(&tree, 1);
        }
        Commands::Registry { file } => {
            let registry = ModuleRegistry::load(&file)
                .with_context(|| format!("Failed to load registry '{}'", file))?;

            println!("{} module(s) in {}", registry.len(), file);
            for descriptor in registry.descriptors() {
                let alias = descriptor
                    .alias
                    .as_deref()
                    .map(|a| format!(" ({})", a))
                    .unwrap_or_default();
                match &descriptor.conditions {
                    Some(conditions) => println!(
                        "  {}{}: {:?} [{}]",
                        descriptor.path,
                        alias,
                        descriptor.activation_kind(),
                        conditions
                    ),
                    None => println!(
                        "  {}{}: {:?}",
                        descriptor.path,
                        alias,
                        descriptor.activation_kind()
                    ),
                }
            }
        }
    }

    Ok(())
}
