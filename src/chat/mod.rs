// Interactive chat shell
// Reads questions line by line and prints answers grounded in the ingested document


use std::future::Future;
use std::io::{self, BufRead, ErrorKind, Write};
use std::thread;

use console::{Term, style};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::Result;
use crate::config::Config;
use crate::providers::Generator;
use crate::search::{Retriever, SearchService};

const RULE: &str = "============================================================";
const PROMPT: &str = "💬 Sua pergunta: ";

/// A line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Help,
    Clear,
    Info,
    Ask(String),
    Empty,
}

impl Command {
    /// Commands match case-insensitively after trimming; anything else is a question
    #[inline]
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "" => Self::Empty,
            "sair" | "exit" | "quit" | "q" => Self::Exit,
            "help" | "ajuda" | "?" => Self::Help,
            "clear" | "cls" => Self::Clear,
            "info" => Self::Info,
            _ => Self::Ask(trimmed.to_string()),
        }
    }
}

/// How a chat session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user typed an exit command
    Exit,
    /// Input was closed (Ctrl+D)
    EndOfInput,
    /// The interrupt future fired (Ctrl+C)
    Interrupted,
}

/// Lines of `reader`, read on a detached thread.
///
/// A read that is still pending when the session ends is abandoned with the
/// thread, so the process can exit without waiting for more input.
#[inline]
pub fn spawn_line_reader<B>(reader: B) -> io::Result<mpsc::Receiver<io::Result<String>>>
where
    B: BufRead + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(1);

    thread::Builder::new()
        .name("chat-input".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let fatal = matches!(&line, Err(e) if e.kind() != ErrorKind::InvalidData);
                if sender.blocking_send(line).is_err() || fatal {
                    break;
                }
            }
        })?;

    Ok(receiver)
}

pub struct ChatShell<R, G> {
    service: SearchService<R, G>,
    config: Config,
    terminal: Option<Term>,
}

impl<R: Retriever, G: Generator> ChatShell<R, G> {
    #[inline]
    pub fn new(service: SearchService<R, G>, config: Config) -> Self {
        Self {
            service,
            config,
            terminal: None,
        }
    }

    /// Terminal cleared by the `clear` command; without one, `clear` only reprints the banner
    #[inline]
    #[must_use]
    pub fn with_terminal(mut self, terminal: Term) -> Self {
        self.terminal = Some(terminal);
        self
    }

    /// Run the read-answer loop until exit, end of input or `interrupt` completes
    #[inline]
    pub async fn run<W, F>(
        &self,
        mut lines: mpsc::Receiver<io::Result<String>>,
        output: &mut W,
        interrupt: F,
    ) -> Result<SessionEnd>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        self.print_banner(output)?;

        loop {
            write!(output, "{}", style(PROMPT).bold())?;
            output.flush()?;

            let line = tokio::select! {
                biased;
                () = &mut interrupt => {
                    print_interrupted(output)?;
                    return Ok(SessionEnd::Interrupted);
                }
                line = lines.recv() => line,
            };

            let line = match line {
                Some(Ok(line)) => line,
                None => {
                    writeln!(output)?;
                    print_farewell(output)?;
                    return Ok(SessionEnd::EndOfInput);
                }
                Some(Err(e)) if e.kind() == ErrorKind::InvalidData => {
                    warn!("Ignoring unreadable input line: {}", e);
                    writeln!(output, "\n❌ Erro inesperado: {}", e)?;
                    writeln!(output, "💡 Tente novamente ou digite 'sair' para encerrar.\n")?;
                    continue;
                }
                Some(Err(e)) => return Err(e.into()),
            };

            match Command::parse(&line) {
                Command::Empty => {}
                Command::Exit => {
                    print_farewell(output)?;
                    return Ok(SessionEnd::Exit);
                }
                Command::Help => print_help(output)?,
                Command::Clear => {
                    output.flush()?;
                    if let Some(terminal) = &self.terminal {
                        terminal.clear_screen()?;
                    }
                    self.print_banner(output)?;
                }
                Command::Info => self.print_info(output)?,
                Command::Ask(question) => {
                    debug!("Question: {}", question);
                    writeln!(output, "\n⏳ Processando...\n")?;
                    output.flush()?;

                    let answer = tokio::select! {
                        biased;
                        () = &mut interrupt => {
                            print_interrupted(output)?;
                            return Ok(SessionEnd::Interrupted);
                        }
                        answer = self.service.answer(&question, None) => answer,
                    };
                    print_answer(output, &answer)?;
                }
            }
        }
    }

    /// Answer a single question without entering the loop
    #[inline]
    pub async fn ask_once<W: Write>(&self, question: &str, output: &mut W) -> Result<String> {
        writeln!(output, "\n❓ Pergunta: {}\n", question)?;
        writeln!(output, "⏳ Processando...\n")?;
        output.flush()?;

        let answer = self.service.answer(question, None).await;
        print_answer(output, &answer)?;
        Ok(answer)
    }

    fn print_banner<W: Write>(&self, output: &mut W) -> Result<()> {
        writeln!(output, "\n{}", RULE)?;
        writeln!(output, "{}", style("💬 CHAT COM PDF - RAG SYSTEM").bold().cyan())?;
        writeln!(output, "{}", RULE)?;
        writeln!(output, "🤖 Provider: {}", self.config.provider.display_name())?;
        writeln!(output, "📚 Collection: {}", self.config.collection)?;
        writeln!(output, "🔍 Search K: {}", self.service.default_k())?;
        writeln!(output, "{}", RULE)?;
        writeln!(output, "\n💡 Dicas:")?;
        writeln!(output, "   - Digite sua pergunta e pressione Enter")?;
        writeln!(output, "   - Digite 'sair', 'exit', 'quit' ou 'q' para encerrar")?;
        writeln!(output, "   - Digite 'help' para ver comandos especiais")?;
        writeln!(output, "{}\n", RULE)?;
        Ok(())
    }

    fn print_info<W: Write>(&self, output: &mut W) -> Result<()> {
        writeln!(output, "\n{}", RULE)?;
        writeln!(output, "{}", style("ℹ️  INFORMAÇÕES DO SISTEMA").bold())?;
        writeln!(output, "{}", RULE)?;
        writeln!(output, "{}", self.config.summary())?;
        writeln!(output, "{}\n", RULE)?;
        Ok(())
    }
}

fn print_help<W: Write>(output: &mut W) -> Result<()> {
    writeln!(output, "\n{}", RULE)?;
    writeln!(output, "{}", style("📖 COMANDOS DISPONÍVEIS").bold())?;
    writeln!(output, "{}", RULE)?;
    writeln!(output, "  help, ajuda, ?       - Mostra esta mensagem")?;
    writeln!(output, "  sair, exit, quit, q  - Encerra o chat")?;
    writeln!(output, "  clear, cls           - Limpa a tela")?;
    writeln!(output, "  info                 - Mostra informações do sistema")?;
    writeln!(output, "{}\n", RULE)?;
    Ok(())
}

fn print_answer<W: Write>(output: &mut W, answer: &str) -> Result<()> {
    writeln!(output, "{}", RULE)?;
    writeln!(output, "{}", style("💬 RESPOSTA:").bold().green())?;
    writeln!(output, "{}", RULE)?;
    writeln!(output, "{}", answer)?;
    writeln!(output, "{}\n", RULE)?;
    Ok(())
}

fn print_farewell<W: Write>(output: &mut W) -> Result<()> {
    writeln!(output, "\n👋 Encerrando chat. Até logo!")?;
    writeln!(output, "{}\n", RULE)?;
    Ok(())
}

fn print_interrupted<W: Write>(output: &mut W) -> Result<()> {
    writeln!(output, "\n\n👋 Chat interrompido pelo usuário (Ctrl+C).")?;
    writeln!(output, "{}\n", RULE)?;
    Ok(())
}
