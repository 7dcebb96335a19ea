//! External command backend
//!
//! A provider runs its command line and reads the trimmed stdout; a setter
//! first substitutes its value into the `${param}` placeholder of the
//! template. Command lines are tokenized like a POSIX shell but never run
//! through one. The child is killed when the call deadline passes.

use super::template::{self, Value};
use super::{
    BoolProvider, BoolSetter, CallContext, FloatProvider, FloatSetter, IntProvider, IntSetter,
    Setter, StringProvider, map_provider, parse_float, parse_int, provider, setter, truish,
};
use crate::error::{HeliosError, Result};
use crate::logging::StructuredLogger;
use std::process::Stdio;
use tokio::process::Command;

/// Command line template bound to a logger
#[derive(Debug, Clone)]
pub struct Exec {
    cmd: String,
    logger: StructuredLogger,
}

impl Exec {
    /// Create a command backend; rejects empty or unbalanced command lines
    /// and placeholder formats that can never render
    pub fn new(cmd: impl Into<String>, logger: StructuredLogger) -> Result<Self> {
        let cmd = cmd.into();
        let args = shell_words::split(&cmd)
            .map_err(|e| HeliosError::config(format!("invalid command '{}': {}", cmd, e)))?;
        if args.is_empty() {
            return Err(HeliosError::config("exec: missing command"));
        }
        template::check_template(&cmd)
            .map_err(|e| HeliosError::config(format!("invalid command '{}': {}", cmd, e)))?;
        Ok(Self { cmd, logger })
    }

    pub fn command(&self) -> &str {
        &self.cmd
    }

    /// Run `cmdline` and return its trimmed stdout.
    ///
    /// A non-zero exit is an error carrying stderr, or stdout when stderr is empty.
    pub async fn output(&self, ctx: CallContext, cmdline: &str) -> Result<String> {
        let args = shell_words::split(cmdline)
            .map_err(|e| HeliosError::command(format!("invalid command '{}': {}", cmdline, e)))?;
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| HeliosError::command("exec: missing command"))?;

        if ctx.is_expired() {
            return Err(HeliosError::timeout(format!(
                "command {} not started, deadline passed",
                program
            )));
        }

        let mut command = Command::new(program);
        command.args(rest).stdin(Stdio::null()).kill_on_drop(true);

        let what = format!("command {}", program);
        let output = ctx
            .run(&what, async {
                command
                    .output()
                    .await
                    .map_err(|e| HeliosError::command(format!("{}: {}", program, e)))
            })
            .await
            .inspect_err(|e| self.logger.warn(&format!("{} <- {}", e, args.join(","))))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() { stdout } else { stderr };
            self.logger.warn(&format!("{} <- {}", detail, args.join(",")));
            return Err(HeliosError::command(format!(
                "{} {}: {}",
                program, output.status, detail
            )));
        }

        self.logger.trace(&format!("{} <- {}", stdout, args.join(",")));
        Ok(stdout)
    }

    pub fn string_provider(&self) -> StringProvider {
        let exec = self.clone();
        provider(move |ctx| {
            let exec = exec.clone();
            async move { exec.output(ctx, &exec.cmd).await }
        })
    }

    pub fn int_provider(&self) -> IntProvider {
        map_provider(self.string_provider(), |s: String| parse_int(&s))
    }

    pub fn float_provider(&self) -> FloatProvider {
        map_provider(self.string_provider(), |s: String| parse_float(&s))
    }

    /// "1", "true" and "on" read as true
    pub fn bool_provider(&self) -> BoolProvider {
        map_provider(self.string_provider(), |s: String| Ok(truish(&s)))
    }

    pub fn int_setter(&self, param: &str) -> IntSetter {
        self.value_setter(param)
    }

    pub fn float_setter(&self, param: &str) -> FloatSetter {
        self.value_setter(param)
    }

    pub fn bool_setter(&self, param: &str) -> BoolSetter {
        self.value_setter(param)
    }

    fn value_setter<T>(&self, param: &str) -> Setter<T>
    where
        T: Into<Value> + Send + 'static,
    {
        let exec = self.clone();
        let param = param.to_string();
        setter(move |ctx, value: T| {
            let exec = exec.clone();
            let cmdline = template::replace_one(&exec.cmd, &param, value);
            async move {
                let cmdline = cmdline?;
                exec.output(ctx, &cmdline).await?;
                Ok(())
            }
        })
    }
}
