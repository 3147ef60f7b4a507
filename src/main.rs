use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use std::io::{BufRead, Write};

use rchat::args_handler::Args;
use rchat::llm::LlamaGenerator;
use rchat::repl::{Command, EXAMPLE_PROMPTS, HELP};
use rchat::ChatSession;

fn main() -> Result<()> {
    let args: Args = Args::parse();

    env_logger::Builder::new()
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .parse_default_env()
        .init();

    let generator = LlamaGenerator::new(&args)?;
    let config = args.chat_config();
    info!("starting {:?} session with {:?} template", config.mode, config.template);
    let mut session = ChatSession::new(generator, config);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut input = String::new();

    println!("Assistant: How can I help you today? (/help for commands)");
    loop {
        print!("\nYou: ");
        stdout.flush().context("failed to flush stdout")?;

        input.clear();
        if stdin
            .lock()
            .read_line(&mut input)
            .context("failed to read from stdin")?
            == 0
        {
            break;
        }

        match Command::parse(&input) {
            Command::Send(message) => {
                if let Some(reply) = session.send(message) {
                    println!("\nAssistant: {reply}");
                }
            }
            Command::Reset => {
                session.reset();
                println!("Conversation cleared.");
            }
            Command::History => {
                for turn in session.history().turns() {
                    println!("\nYou: {}\nAssistant: {}", turn.user, turn.assistant);
                }
            }
            Command::Examples => {
                for example in EXAMPLE_PROMPTS {
                    println!("  {example}");
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Blank => {}
            Command::Unknown(command) => println!("unknown command {command}, try /help"),
        }
    }

    Ok(())
}
