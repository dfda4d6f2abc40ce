// Command-line application

use crate::container::Container;
use crate::error::{Error, Result};
use crate::events::{BuildConsoleCommands, EventDispatcher};
use async_trait::async_trait;
use azura_log::{debug, info};
use clap::ArgMatches;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::sync::Arc;

pub const DEFAULT_NAME: &str = "Command Line Interface";
pub const DEFAULT_VERSION: &str = "1.0.0";

/// A named console command.
#[async_trait]
pub trait Command: Send + Sync {
    /// Name used on the command line, e.g. `cache:clear`.
    fn name(&self) -> &'static str;

    fn about(&self) -> &'static str {
        ""
    }

    /// Declare arguments and options.
    fn configure(&self, command: clap::Command) -> clap::Command {
        command
    }

    /// Run the command and return its exit code.
    async fn execute(&self, console: &ConsoleApplication, args: &ArgMatches) -> Result<i32>;
}

/// Console application holding registered commands and the container they
/// draw services from.
#[derive(Clone)]
pub struct ConsoleApplication {
    name: String,
    version: String,
    container: Container,
    commands: BTreeMap<String, Arc<dyn Command>>,
}

impl ConsoleApplication {
    pub fn new(name: impl Into<String>, version: impl Into<String>, container: Container) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            container,
            commands: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Register a command, replacing one with the same name.
    pub fn add<C: Command + 'static>(&mut self, command: C) -> &mut Self {
        debug!(command = command.name(), "Registering console command");
        self.commands.insert(command.name().to_string(), Arc::new(command));
        self
    }

    pub fn has(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn command_names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    /// Fetch a service from the container for use inside a command.
    pub fn get_service<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        if !self.container.has(name) {
            return Err(Error::exception(format!("Service \"{}\" not found.", name)));
        }
        self.container.get::<T>(name)
    }

    fn cli(&self) -> clap::Command {
        let mut cli = clap::Command::new(self.name.clone())
            .version(self.version.clone())
            .disable_help_subcommand(true);

        for command in self.commands.values() {
            cli = cli.subcommand(self.subcommand(command.as_ref()));
        }
        cli
    }

    fn subcommand(&self, command: &dyn Command) -> clap::Command {
        command.configure(clap::Command::new(command.name()).about(command.about()))
    }

    /// Run another registered command with the given arguments.
    pub async fn run_command(&self, name: &str, args: &[&str]) -> Result<i32> {
        let command = self
            .commands
            .get(name)
            .cloned()
            .ok_or_else(|| Error::exception(format!("Command \"{}\" is not defined.", name)))?;

        let matches = self
            .subcommand(command.as_ref())
            .try_get_matches_from(std::iter::once(name).chain(args.iter().copied()))
            .map_err(|e| Error::exception(e.to_string()))?;

        info!(command = name, "Running console command");
        command.execute(self, &matches).await
    }

    /// Let listeners register their commands, parse `args` (program name
    /// first) and run the selected command.
    pub async fn run<I, T>(self, args: I) -> Result<i32>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let console = self.build_commands()?;

        let matches = match console.cli().try_get_matches_from(args) {
            Ok(matches) => matches,
            Err(e) => {
                e.print()?;
                return Ok(e.exit_code());
            }
        };

        match matches.subcommand() {
            Some((name, sub_matches)) => {
                let command = console
                    .commands
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::exception(format!("Command \"{}\" is not defined.", name)))?;
                info!(command = name, "Running console command");
                command.execute(&console, sub_matches).await
            }
            None => {
                console.cli().print_help()?;
                Ok(0)
            }
        }
    }

    fn build_commands(self) -> Result<Self> {
        if !self.container.has_type::<EventDispatcher>() {
            return Ok(self);
        }
        let dispatcher = self.container.resolve::<EventDispatcher>()?;
        Ok(dispatcher.dispatch(BuildConsoleCommands::new(self))?.into_console())
    }
}

impl std::fmt::Debug for ConsoleApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleApplication")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("commands", &self.command_names())
            .finish()
    }
}
