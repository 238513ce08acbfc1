//! The compiler binary: takes a source file, an optional output format, and
//! an optimization flag.
//!
//! Run with `--help` for more info.

use armlite::{back, front, middle};

use clap::{Parser, ValueEnum};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the input file
    file: String,
    /// the output format
    #[arg(value_enum, short, long, default_value_t = Output::Asm)]
    out: Output,
    /// turn on optimizations
    #[arg(short = 'O', default_value_t = false)]
    optimize: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
enum Output {
    /// the list of tokens
    Tokens,
    /// the ast data structure
    Ast,
    /// the lowered IR, after optimizations if requested
    Ir,
    /// the textual instruction listing
    Asm,
}

fn get_ir(input: &str, optimize: bool) -> middle::Program {
    let ast = front::parse(input).expect("input should parse");
    middle::lower(ast, optimize).expect("input should lower")
}

fn main() {
    env_logger::init();

    use Output::*;
    let args = Args::parse();

    log::info!("reading '{}'", args.file);
    let input = String::from_utf8(std::fs::read(&args.file).expect("file should be readable"))
        .expect("input characters should be utf8");

    match args.out {
        Tokens => {
            let mut lexer = front::lex::Lexer::new(&input);
            loop {
                match lexer.next() {
                    Ok(Some(token)) => println!("{token}"),
                    Ok(None) => break,
                    Err(e) => {
                        eprintln!("lex error: {e}");
                        std::process::exit(1);
                    }
                }
            }
        }
        Ast => match front::parse(&input) {
            Ok(ast) => println!("{ast:?}"),
            Err(e) => {
                eprintln!("parse error: {e}");
                std::process::exit(1);
            }
        },
        Ir => {
            println!("{:?}", get_ir(&input, args.optimize));
        }
        Asm => {
            println!("{}", back::listing(&get_ir(&input, args.optimize)));
        }
    }
}
