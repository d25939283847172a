use std::fs;
use std::process;

use clap::{Arg, Command};

use oba::{InterpretError, Vm};

// exit codes, following the BSD sysexits convention
const EXIT_SUCCESS: i32 = 0;
const EXIT_COMPILE_ERROR: i32 = 65;
const EXIT_RUNTIME_ERROR: i32 = 70;
const EXIT_READ_ERROR: i32 = 74;

fn main() {
    env_logger::init();

    let app = Command::new("oba")
        .version("0.1")
        .about("An interpreter for the Oba programming language")
        .arg(
            Arg::new("file")
            .index(1)
            .help("path to input script file")
            .value_name("FILE")
        )
        .arg(
            Arg::new("cmd")
            .short('c')
            .help("execute a snippet then exit")
            .value_name("CMD")
            .takes_value(true)
        );

    let args = app.get_matches();

    let source = if let Some(snippet) = args.value_of("cmd") {
        snippet.to_string()
    } else if let Some(path) = args.value_of("file") {
        match fs::read_to_string(path) {
            Ok(source) => source,
            Err(error) => {
                eprintln!("Error reading \"{}\": {}", path, error);
                process::exit(EXIT_READ_ERROR);
            }
        }
    } else {
        eprintln!("Usage: oba [FILE] or oba -c CMD");
        process::exit(EXIT_READ_ERROR);
    };

    let mut vm = Vm::new();
    let code = match vm.interpret(&source) {
        Ok(()) => EXIT_SUCCESS,
        Err(InterpretError::Compile(_)) => EXIT_COMPILE_ERROR,
        Err(InterpretError::Runtime(_)) => EXIT_RUNTIME_ERROR,
    };
    process::exit(code);
}
