use std::path::Path;

use serde::{Deserialize, Serialize};

/// Configuration for the Java compiler and runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Compiler binary, a bare name resolved on PATH or a path
    #[serde(default = "default_javac")]
    pub javac: String,

    /// Runtime binary, a bare name resolved on PATH or a path
    #[serde(default = "default_java")]
    pub java: String,

    /// Extra compiler arguments, placed before the source file
    #[serde(default)]
    pub compile_args: Vec<String>,

    /// Extra JVM arguments, placed before the classpath
    #[serde(default)]
    pub run_args: Vec<String>,
}

impl ToolchainConfig {
    /// Build the compiler command line for a source file
    ///
    /// `javac [compile_args] <source>`
    pub fn compile_command(&self, source_name: &str) -> Vec<String> {
        let mut command = Vec::with_capacity(self.compile_args.len() + 2);
        command.push(self.javac.clone());
        command.extend(self.compile_args.iter().cloned());
        command.push(source_name.to_owned());
        command
    }

    /// Build the runtime command line for an entry point
    ///
    /// `java [run_args] -cp <classpath> <entry_point>`
    pub fn run_command(&self, classpath: &Path, entry_point: &str) -> Vec<String> {
        let mut command = Vec::with_capacity(self.run_args.len() + 4);
        command.push(self.java.clone());
        command.extend(self.run_args.iter().cloned());
        command.push("-cp".to_owned());
        command.push(classpath.to_string_lossy().into_owned());
        command.push(entry_point.to_owned());
        command
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            javac: default_javac(),
            java: default_java(),
            compile_args: Vec::new(),
            run_args: Vec::new(),
        }
    }
}

fn default_javac() -> String {
    "javac".to_owned()
}

fn default_java() -> String {
    "java".to_owned()
}
