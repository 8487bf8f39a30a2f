use argh::FromArgs;
use pipesh::Interpreter;

#[derive(FromArgs)]
/// A small shell with pipelines, redirections and background jobs.
struct Options {
    #[argh(option, short = 'c')]
    /// run this line instead of reading from the terminal; may be repeated.
    command: Vec<String>,
}

fn main() {
    env_logger::init();
    let options: Options = argh::from_env();

    let mut interpreter = Interpreter::new();
    let jobs = interpreter.jobs();
    if let Err(e) = ctrlc::set_handler(move || {
        jobs.terminate_all();
        eprintln!("Stopped all processes");
    }) {
        log::warn!("failed to install interrupt handler: {}", e);
    }

    let code = if options.command.is_empty() {
        match interpreter.repl() {
            Ok(code) => code,
            Err(e) => {
                eprintln!("pipesh: {}", e);
                1
            }
        }
    } else {
        let code = interpreter.run_lines(&options.command);
        // Running out of lines is like closing the terminal.
        interpreter.jobs().terminate_all();
        code
    };
    std::process::exit(code);
}
