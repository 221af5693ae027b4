//! Page compiler collaborator.
//!
//! # Responsibilities
//! - Describe one compilation (`CompileJob`) and its result
//! - Run an external compiler program for a single page source
//!
//! # Design Decisions
//! - The compiler is a trait so the bridge never depends on a concrete tool
//! - Compiler diagnostics stay in the error value and the logs; they are
//!   never written into a response

use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;
use tokio::process::Command;

/// Package every compiled page class lives under.
pub const PAGE_PACKAGE: &str = "pages";

/// Failures while compiling a page.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to start compiler {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("compiler exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("invalid classpath entry: {0}")]
    Classpath(#[from] std::env::JoinPathsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One page compilation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileJob {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub class_name: String,
    pub package: String,
    pub classpath: Vec<PathBuf>,
}

impl CompileJob {
    /// Build a job for `page` (path relative to the web root, `/`-separated).
    pub fn for_page(page: &str, source: PathBuf, output_dir: PathBuf, classpath: Vec<PathBuf>) -> Self {
        let (dir, file) = match page.rfind('/') {
            Some(idx) => (&page[..idx], &page[idx + 1..]),
            None => ("", page),
        };
        Self {
            source,
            output_dir,
            class_name: class_name_for(file),
            package: package_for(dir),
            classpath,
        }
    }

    /// Fully-qualified name of the class the job produces.
    pub fn qualified_name(&self) -> String {
        if self.package.is_empty() {
            self.class_name.clone()
        } else {
            format!("{}.{}", self.package, self.class_name)
        }
    }
}

/// File names with a `.` cannot be class names; those get a random one.
pub fn class_name_for(file_name: &str) -> String {
    if file_name.contains('.') {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(4)
            .map(char::from)
            .collect();
        format!("dev{suffix}")
    } else {
        file_name.to_string()
    }
}

fn package_for(relative_dir: &str) -> String {
    let mut package = PAGE_PACKAGE.to_string();
    for segment in relative_dir.split('/').filter(|s| !s.is_empty()) {
        package.push('.');
        package.push_str(segment);
    }
    package
}

/// Result of a successful compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPage {
    /// Fully-qualified class name handed to the handler factory.
    pub class_name: String,
}

/// Compiles a single page source into a loadable handler class.
#[async_trait]
pub trait PageCompiler: Send + Sync {
    async fn compile(&self, job: &CompileJob) -> Result<CompiledPage, CompileError>;
}

/// Runs an external compiler program.
///
/// Invoked as `program [args..] --output-dir DIR --class-name NAME
/// --package PKG --classpath CP SOURCE`.
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessCompiler {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn arguments(&self, job: &CompileJob) -> Result<Vec<OsString>, CompileError> {
        let classpath = std::env::join_paths(&job.classpath)?;
        let mut args: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        args.extend([
            "--output-dir".into(),
            job.output_dir.clone().into_os_string(),
            "--class-name".into(),
            job.class_name.clone().into(),
            "--package".into(),
            job.package.clone().into(),
            "--classpath".into(),
            classpath,
            job.source.clone().into_os_string(),
        ]);
        Ok(args)
    }
}

#[async_trait]
impl PageCompiler for ProcessCompiler {
    async fn compile(&self, job: &CompileJob) -> Result<CompiledPage, CompileError> {
        let args = self.arguments(job)?;
        tracing::debug!(
            program = %self.program.display(),
            source = %job.source.display(),
            class = %job.qualified_name(),
            "Compiling page"
        );

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CompileError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CompileError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(CompiledPage {
            class_name: job.qualified_name(),
        })
    }
}
