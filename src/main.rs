use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use lox_interpreter as lox;

use clap::error::ErrorKind;
use clap::Parser as ClapParser;
use clap::Subcommand;

use lox::ast_printer::AstPrinter;
use lox::error::LoxError;
use lox::interpreter::Interpreter;
use lox::parser::Parser;
use lox::resolver::Resolver;
use lox::scanner::Scanner;
use lox::token::Token;

#[derive(ClapParser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prints the token stream of the given source file
    Tokenize { filename: PathBuf },

    /// Prints the parenthesized syntax tree of a single expression
    Parse { filename: PathBuf },

    /// Evaluates a single expression and prints its value
    Evaluate { filename: PathBuf },

    /// Executes a program
    Run { filename: PathBuf },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Cli = match Cli::try_parse() {
        Ok(args) => args,

        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return Ok(());
        }

        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    match args.command {
        Commands::Tokenize { filename } => tokenize(&filename)?,

        Commands::Parse { filename } => parse(&filename)?,

        Commands::Evaluate { filename } => evaluate(&filename)?,

        Commands::Run { filename } => run(&filename)?,
    }

    Ok(())
}

fn tokenize(filename: &Path) -> anyhow::Result<()> {
    let mut had_error = false;

    for item in Scanner::new(read_source(filename)?) {
        match item {
            Ok(token) => println!("{}", token),

            Err(e) => {
                had_error = true;
                eprintln!("{}", e);
            }
        }
    }

    if had_error {
        std::process::exit(65);
    }

    Ok(())
}

fn parse(filename: &Path) -> anyhow::Result<()> {
    let tokens: Vec<Token> = scan(read_source(filename)?);

    match Parser::new(tokens).parse_expression() {
        Ok(expr) => println!("{}", AstPrinter::print(&expr)),

        Err(errors) => exit_with(&errors),
    }

    Ok(())
}

fn evaluate(filename: &Path) -> anyhow::Result<()> {
    let tokens: Vec<Token> = scan(read_source(filename)?);

    let expr = match Parser::new(tokens).parse_expression() {
        Ok(expr) => expr,

        Err(errors) => exit_with(&errors),
    };

    let mut interpreter = Interpreter::new();

    match interpreter.evaluate_expression(&expr) {
        Ok(value) => println!("{}", value),

        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(e.exit_code());
        }
    }

    Ok(())
}

fn run(filename: &Path) -> anyhow::Result<()> {
    let tokens: Vec<Token> = scan(read_source(filename)?);

    let statements = match Parser::new(tokens).parse() {
        Ok(statements) => statements,

        Err(errors) => exit_with(&errors),
    };

    let mut interpreter = Interpreter::new();

    let resolve_errors = Resolver::new(&mut interpreter).resolve(&statements);

    if !resolve_errors.is_empty() {
        exit_with(&resolve_errors);
    }

    if let Err(e) = interpreter.interpret(&statements) {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }

    Ok(())
}

fn read_source(filename: &Path) -> anyhow::Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    let mut reader: BufReader<File> = BufReader::new(File::open(filename)?);

    reader.read_to_end(&mut buf)?;

    Ok(buf)
}

/// Scan the whole buffer, reporting lex errors to stderr. A lex error ends
/// the pipeline here with the compile-time exit code.
fn scan(buf: Vec<u8>) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut had_error = false;

    for item in Scanner::new(buf) {
        match item {
            Ok(token) => tokens.push(token),

            Err(e) => {
                had_error = true;
                eprintln!("{}", e);
            }
        }
    }

    if had_error {
        std::process::exit(65);
    }

    tokens
}

fn exit_with(errors: &[LoxError]) -> ! {
    for e in errors {
        eprintln!("{}", e);
    }

    std::process::exit(errors.first().map_or(65, LoxError::exit_code));
}
