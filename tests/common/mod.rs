//! Shared testing utilities for al CLI and library tests.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

use al::adapters::EmbeddedTemplates;
use al::ports::TemplateSource;

/// Testing harness providing an isolated repository root.
#[allow(dead_code)]
pub struct TestContext {
    root: TempDir,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temp directory for tests");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    fn abs(&self, rel: &str) -> PathBuf {
        let mut path = self.root.path().to_path_buf();
        for component in rel.split('/') {
            path.push(component);
        }
        path
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.abs(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directories");
        }
        fs::write(path, content).expect("failed to write test file");
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.abs(rel)).expect("failed to read test file")
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.abs(rel).exists()
    }

    /// Content of an embedded template, as shipped in this binary.
    pub fn template(&self, rel: &str) -> String {
        let templates = EmbeddedTemplates::new();
        String::from_utf8(templates.read(rel).expect("missing embedded template"))
            .expect("template is not UTF-8")
    }

    /// Seed the repo with every embedded template, verbatim.
    pub fn seed_current_templates(&self) {
        let templates = EmbeddedTemplates::new();
        templates
            .walk("", &mut |rel, bytes| {
                self.write(rel, &String::from_utf8_lossy(bytes));
                Ok(())
            })
            .expect("failed to walk embedded templates");
    }

    /// Build a command for invoking the compiled `al` binary in this repo.
    pub fn cli(&self) -> Command {
        let mut cmd = Command::cargo_bin("al").expect("failed to locate al binary");
        cmd.current_dir(self.root());
        cmd
    }
}

/// Prior-release (0.3.0) file content, mirroring the embedded 0.3.0 manifest.
#[allow(dead_code)]
pub mod v030 {
    pub const CORE: &str = "# Agent Layer Instructions\n\nThese instructions apply to every agent session in this repository.\n\n- Record new defects in `docs/agent-layer/ISSUES.md` under the entries marker.\n- Only run commands listed in `.agent-layer/commands.allow`.\n";

    pub const COMMANDS_ALLOW: &str =
        "# Commands agents may run without confirmation.\ngit status\ngit diff\n";

    pub const ISSUES: &str =
        "# Issues\n\nKnown defects recorded by agent sessions.\n\n<!-- ENTRIES START -->\n";

    pub const ROADMAP: &str =
        "# Roadmap\n\n<!-- PHASES START -->\n- [ ] Describe the first phase of work here.\n";
}

/// Seed a repository as a 0.3.0-era installation.
#[allow(dead_code)]
pub fn seed_v030(ctx: &TestContext) {
    ctx.write(".agent-layer/al.version", "0.3.0\n");
    ctx.write(".agent-layer/commands.allow", v030::COMMANDS_ALLOW);
    ctx.write(".agent-layer/config.toml", &ctx.template(".agent-layer/config.toml"));
    ctx.write(".agent-layer/instructions/core.md", v030::CORE);
    ctx.write(
        ".agent-layer/instructions/workflow.md",
        &ctx.template(".agent-layer/instructions/workflow.md"),
    );
    ctx.write(
        ".agent-layer/slash-commands/find-issues-legacy.md",
        &ctx.template(".agent-layer/slash-commands/find-issues.md"),
    );
    ctx.write(
        ".agent-layer/slash-commands/fix-issue.md",
        &ctx.template(".agent-layer/slash-commands/fix-issue.md"),
    );
    ctx.write("docs/agent-layer/README.md", &ctx.template("docs/agent-layer/README.md"));
    ctx.write("docs/agent-layer/ISSUES.md", v030::ISSUES);
    ctx.write("docs/agent-layer/ROADMAP.md", v030::ROADMAP);
}
