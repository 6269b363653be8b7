use crate::{
    config::GenerateConfig,
    error::{Error, Result},
    template::strip_draft_mode,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;
use tracing::{debug, info, trace};

/// Drives the external LaTeX toolchain for one generation run.
///
/// Each variant is compiled in its own directory under a per-run temporary
/// workspace, so auxiliary files from one variant never leak into another.
/// The moodle.sty toolchain leaves a `<name>-moodle.xml` artifact next to
/// the compiled document; that artifact is the runner's product.
#[derive(Debug)]
pub(crate) struct LatexRunner {
    pdflatex: PathBuf,
    pythontex: Option<PathBuf>,
    capture_logs: bool,
    keep_temps: bool,
    log_dir: PathBuf,
    workspace: TempDir,
}

impl LatexRunner {
    /// Resolves the toolchain binaries and creates the run workspace.
    ///
    /// Resolution happens before any row is rendered, so a missing
    /// toolchain fails the run up front.
    ///
    /// # Errors
    ///
    /// Returns a compilation error if a required binary is not on the
    /// PATH, or an IO error if the workspace cannot be created.
    pub(crate) fn new(config: &GenerateConfig, log_dir: impl Into<PathBuf>) -> Result<Self> {
        let pdflatex = which::which(&config.pdflatex_cmd).map_err(|_| {
            Error::compile(
                &config.pdflatex_cmd,
                "not found on PATH; install a TeX distribution or pass --pdflatex",
            )
        })?;

        let pythontex = if config.pythontex {
            let resolved = which::which(&config.pythontex_cmd).map_err(|_| {
                Error::compile(
                    &config.pythontex_cmd,
                    "not found on PATH; install pythontex or pass --no-pythontex",
                )
            })?;
            Some(resolved)
        } else {
            None
        };

        let workspace = tempfile::Builder::new()
            .prefix("genmq-")
            .tempdir()
            .map_err(|e| Error::io(std::env::temp_dir(), e))?;

        debug!(
            "Toolchain ready: pdflatex={}, pythontex={}, workspace={}",
            pdflatex.display(),
            pythontex
                .as_deref()
                .map_or_else(|| "disabled".to_string(), |p| p.display().to_string()),
            workspace.path().display()
        );

        Ok(Self {
            pdflatex,
            pythontex,
            capture_logs: config.capture_logs,
            keep_temps: config.keep_temps,
            log_dir: log_dir.into(),
            workspace,
        })
    }

    /// Compiles one rendered variant and returns the path of its
    /// `<name>-moodle.xml` artifact.
    ///
    /// The document's moodle.sty draft option is removed first; with draft
    /// set the package skips writing the artifact entirely. In the default
    /// configuration the sequence is pdflatex, pythontex, pdflatex; with
    /// pythontex disabled a single pdflatex pass runs.
    ///
    /// # Errors
    ///
    /// Returns a compilation error if any toolchain step fails to start or
    /// exits non-zero, or if no artifact appears afterwards.
    pub(crate) fn compile_variant(&self, name: &str, document: &str) -> Result<PathBuf> {
        let workdir = self.workspace.path().join(name);
        fs::create_dir_all(&workdir).map_err(|e| Error::io(&workdir, e))?;

        let tex_name = format!("{name}.tex");
        let tex_path = workdir.join(&tex_name);
        fs::write(&tex_path, strip_draft_mode(document)).map_err(|e| Error::io(&tex_path, e))?;

        let pdflatex_args = [
            "-shell-escape",
            "-synctex=1",
            "-interaction=nonstopmode",
            tex_name.as_str(),
        ];

        self.run_tool(
            &self.pdflatex,
            "pdflatex",
            &pdflatex_args,
            &workdir,
            &format!("{name}-pdflatex.log"),
        )?;

        if let Some(pythontex) = &self.pythontex {
            self.run_tool(
                pythontex,
                "pythontex",
                &[tex_name.as_str()],
                &workdir,
                &format!("{name}-pythontex.log"),
            )?;
            self.run_tool(
                &self.pdflatex,
                "pdflatex",
                &pdflatex_args,
                &workdir,
                &format!("{name}-pdflatex-rerun.log"),
            )?;
        }

        let artifact = workdir.join(format!("{name}-moodle.xml"));
        if !artifact.exists() {
            return Err(Error::compile(
                "pdflatex",
                format!(
                    "compilation of '{name}.tex' produced no '{name}-moodle.xml'; \
                     the template must load the moodle package"
                ),
            ));
        }

        trace!("Variant '{}' compiled, artifact at {}", name, artifact.display());
        Ok(artifact)
    }

    /// Removes the run workspace, or keeps it for inspection when
    /// configured to.
    ///
    /// # Errors
    ///
    /// Returns an IO error if workspace removal fails.
    pub(crate) fn finish(self) -> Result<()> {
        if self.keep_temps {
            let kept = self.workspace.keep();
            info!("Keeping compile workspace at {}", kept.display());
            return Ok(());
        }

        let path = self.workspace.path().to_path_buf();
        self.workspace.close().map_err(|e| Error::io(path, e))
    }

    /// Disposes of the run workspace after a failed compile.
    ///
    /// The workspace is kept for inspection when configured to, exactly as
    /// on success; it holds the `.tex` inputs of the step that failed.
    /// Removal errors are discarded.
    pub(crate) fn abort(self) {
        if self.keep_temps {
            let kept = self.workspace.keep();
            info!("Keeping compile workspace at {}", kept.display());
        }
    }

    /// Runs one toolchain step with captured output.
    fn run_tool(
        &self,
        program: &Path,
        tool: &str,
        args: &[&str],
        workdir: &Path,
        log_name: &str,
    ) -> Result<()> {
        debug!("Running {} {}", tool, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .current_dir(workdir)
            .output()
            .map_err(|e| Error::compile(tool, format!("failed to start: {e}")))?;

        if self.capture_logs {
            self.write_log(log_name, &output)?;
        }

        if !output.status.success() {
            return Err(Error::compile(tool, failure_detail(&output)));
        }

        Ok(())
    }

    /// Writes a step's captured stdout to a log file next to the output.
    fn write_log(&self, log_name: &str, output: &Output) -> Result<()> {
        fs::create_dir_all(&self.log_dir).map_err(|e| Error::io(&self.log_dir, e))?;
        let log_path = self.log_dir.join(log_name);
        fs::write(&log_path, &output.stdout).map_err(|e| Error::io(&log_path, e))?;
        trace!("Wrote toolchain log to {}", log_path.display());
        Ok(())
    }
}

/// Condenses a failed step's output into an error detail.
///
/// pdflatex reports errors on stdout, so stderr is preferred only when it
/// actually has content; either way only the last lines are kept.
fn failure_detail(output: &Output) -> String {
    let stream = if output.stderr.is_empty() {
        &output.stdout
    } else {
        &output.stderr
    };
    let text = String::from_utf8_lossy(stream);

    let lines: Vec<&str> = text.lines().rev().take(8).collect();
    let tail: Vec<&str> = lines.into_iter().rev().collect();

    let status = output
        .status
        .code()
        .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit status {c}"));

    if tail.is_empty() {
        status
    } else {
        format!("{status}\n{}", tail.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn base_config(temp: &assert_fs::TempDir, pdflatex: &Path) -> GenerateConfig {
        let template = temp.child("exam.tex");
        template
            .write_str("\\usepackage[draft]{moodle}\nbody")
            .unwrap();
        let database = temp.child("vars.csv");
        database.write_str("a\n1\n").unwrap();

        GenerateConfig::builder()
            .template(template.path())
            .database(database.path())
            .pdflatex_cmd(pdflatex.to_string_lossy().into_owned())
            .pythontex(false)
            .build()
            .unwrap()
    }

    #[cfg(unix)]
    fn write_stub(temp: &assert_fs::TempDir, name: &str, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let stub = temp.child(name);
        stub.write_str(script).unwrap();
        fs::set_permissions(stub.path(), fs::Permissions::from_mode(0o755)).unwrap();
        stub.path().to_path_buf()
    }

    #[test]
    fn test_missing_binary_fails_before_any_work() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = {
            let template = temp.child("exam.tex");
            template.write_str("body").unwrap();
            let database = temp.child("vars.csv");
            database.write_str("a\n1\n").unwrap();

            GenerateConfig::builder()
                .template(template.path())
                .database(database.path())
                .pdflatex_cmd("genmq-test-no-such-binary")
                .pythontex(false)
                .build()
                .unwrap()
        };

        let err = LatexRunner::new(&config, temp.path()).unwrap_err();
        assert!(err.is_compile());
        assert!(err.to_string().contains("genmq-test-no-such-binary"));
    }

    #[cfg(unix)]
    #[test]
    fn test_compile_variant_collects_artifact() {
        let temp = assert_fs::TempDir::new().unwrap();
        let stub = write_stub(
            &temp,
            "fake-pdflatex",
            "#!/bin/sh\nfor last; do :; done\nstem=\"${last%.tex}\"\n\
             printf '<quiz><question type=\"essay\"><name><text>stub</text></name></question></quiz>' \
             > \"${stem}-moodle.xml\"\n",
        );

        let config = base_config(&temp, &stub);
        let runner = LatexRunner::new(&config, temp.path()).unwrap();

        let artifact = runner
            .compile_variant("exam-001", "\\usepackage[draft]{moodle}\nbody")
            .unwrap();
        let content = fs::read_to_string(&artifact).unwrap();

        assert!(artifact.ends_with("exam-001/exam-001-moodle.xml"));
        assert!(content.contains("stub"));

        // The .tex handed to the toolchain has draft mode stripped.
        let tex = fs::read_to_string(artifact.with_file_name("exam-001.tex")).unwrap();
        assert!(tex.contains("\\usepackage{moodle}"));

        runner.finish().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_step_is_compile_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let stub = write_stub(
            &temp,
            "fake-pdflatex",
            "#!/bin/sh\necho 'LaTeX Error: something broke'\nexit 1\n",
        );

        let config = base_config(&temp, &stub);
        let runner = LatexRunner::new(&config, temp.path()).unwrap();

        let err = runner.compile_variant("exam-001", "body").unwrap_err();
        assert!(err.is_compile());
        assert!(err.to_string().contains("pdflatex"));
        assert!(err.to_string().contains("exit status 1"));
        assert!(err.to_string().contains("something broke"));
    }

    #[cfg(unix)]
    #[test]
    fn test_abort_keeps_workspace_when_asked() {
        let temp = assert_fs::TempDir::new().unwrap();
        let stub = write_stub(&temp, "fake-pdflatex", "#!/bin/sh\nexit 1\n");

        let template = temp.child("exam.tex");
        template.write_str("body").unwrap();
        let database = temp.child("vars.csv");
        database.write_str("a\n1\n").unwrap();

        let config = GenerateConfig::builder()
            .template(template.path())
            .database(database.path())
            .pdflatex_cmd(stub.to_string_lossy().into_owned())
            .pythontex(false)
            .keep_temps(true)
            .build()
            .unwrap();

        let runner = LatexRunner::new(&config, temp.path()).unwrap();
        let workspace = runner.workspace.path().to_path_buf();
        runner.compile_variant("exam-001", "body").unwrap_err();

        runner.abort();

        assert!(workspace.exists());
        // The failing variant's input is still there for inspection.
        assert!(workspace.join("exam-001").join("exam-001.tex").is_file());
        fs::remove_dir_all(&workspace).ok();
    }

    #[cfg(unix)]
    #[test]
    fn test_abort_removes_workspace_by_default() {
        let temp = assert_fs::TempDir::new().unwrap();
        let stub = write_stub(&temp, "fake-pdflatex", "#!/bin/sh\nexit 1\n");

        let config = base_config(&temp, &stub);
        let runner = LatexRunner::new(&config, temp.path()).unwrap();
        let workspace = runner.workspace.path().to_path_buf();

        runner.abort();

        assert!(!workspace.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_silent_toolchain_without_artifact_is_compile_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let stub = write_stub(&temp, "fake-pdflatex", "#!/bin/sh\nexit 0\n");

        let config = base_config(&temp, &stub);
        let runner = LatexRunner::new(&config, temp.path()).unwrap();

        let err = runner.compile_variant("exam-001", "body").unwrap_err();
        assert!(err.is_compile());
        assert!(err.to_string().contains("exam-001-moodle.xml"));
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_logs_writes_step_output() {
        let temp = assert_fs::TempDir::new().unwrap();
        let stub = write_stub(
            &temp,
            "fake-pdflatex",
            "#!/bin/sh\necho 'This is pdfTeX'\nfor last; do :; done\nstem=\"${last%.tex}\"\n\
             printf '<quiz/>' > \"${stem}-moodle.xml\"\n",
        );

        let template = temp.child("exam.tex");
        template.write_str("body").unwrap();
        let database = temp.child("vars.csv");
        database.write_str("a\n1\n").unwrap();
        let log_dir = temp.child("logs");

        let config = GenerateConfig::builder()
            .template(template.path())
            .database(database.path())
            .pdflatex_cmd(stub.to_string_lossy().into_owned())
            .pythontex(false)
            .capture_logs(true)
            .build()
            .unwrap();

        let runner = LatexRunner::new(&config, log_dir.path()).unwrap();
        runner.compile_variant("exam-001", "body").unwrap();

        let log = log_dir.child("exam-001-pdflatex.log");
        assert!(log.exists());
        assert!(fs::read_to_string(log.path()).unwrap().contains("This is pdfTeX"));
    }
}
