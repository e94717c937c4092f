use anyhow::anyhow;
use clap::{Parser, Subcommand};
use shadermix::back::{HlslWriter, WriteShader};
use shadermix::engine::{EngineOptions, MixinEngine};
use shadermix::preprocess::ShaderSourceManager;
use shadermix::reflect::EffectReflection;
use shadermix::{ShaderMacro, ShaderSource, ShaderStage};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a mixin tree into one shader.
    Compile {
        /// Directories searched for `.mxsl` sources and includes.
        #[arg(short, long)]
        include: Vec<PathBuf>,
        /// Macros applied to every class, as NAME or NAME=VALUE.
        #[arg(short, long, value_parser = parse_macro)]
        define: Vec<ShaderMacro>,
        /// The mixin tree to compile.
        ///
        /// For example, `Shading(light=PointLight, lights=[PointLight, DirectionalLight])`
        #[arg(short, long)]
        source: String,
        /// The item to output.
        ///
        /// `json` prints the reflection and entry points, `log` only the diagnostics.
        #[arg(value_enum, short, long, default_value = "hlsl")]
        output: CompileOutput,
    },
    /// Get the preprocessed text of a shader class.
    Preprocess {
        /// Directories searched for `.mxsl` sources and includes.
        #[arg(short, long)]
        include: Vec<PathBuf>,
        /// Macros applied to the class, as NAME or NAME=VALUE.
        #[arg(short, long, value_parser = parse_macro)]
        define: Vec<ShaderMacro>,
        /// The name of the shader class.
        #[arg(short, long)]
        shader: String,
    },
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum CompileOutput {
    #[clap(name = "hlsl")]
    Hlsl,
    #[clap(name = "json")]
    Json,
    #[clap(name = "log")]
    Log,
}

#[derive(serde::Serialize)]
struct CompileReport<'a> {
    entry_points: &'a BTreeMap<ShaderStage, String>,
    hash_sources: BTreeMap<&'a str, String>,
    reflection: &'a EffectReflection,
}

fn parse_macro(text: &str) -> Result<ShaderMacro, String> {
    let (name, definition) = text.split_once('=').unwrap_or((text, ""));
    if name.is_empty() {
        return Err(format!("`{text}` does not name a macro"));
    }
    Ok(ShaderMacro::new(name, definition))
}

pub fn main() -> Result<(), anyhow::Error> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Commands::Compile {
            include,
            define,
            source,
            output,
        } => {
            let source = ShaderSource::from_str(&source)?;
            let engine = MixinEngine::new(
                ShaderSourceManager::with_lookup_directories(include),
                EngineOptions::default(),
            );
            let result = engine.parse(&source, &define);
            eprint!("{}", result.log);
            if result.has_errors() {
                return Err(anyhow!("{source} failed to compile"));
            }

            match output {
                CompileOutput::Log => {}
                CompileOutput::Hlsl => {
                    let Some(shader) = &result.shader else {
                        return Err(anyhow!("no shader was produced"));
                    };
                    let writer = match &result.reflection {
                        Some(reflection) => HlslWriter::with_reflection(reflection),
                        None => HlslWriter::new(),
                    };
                    print!("{}", writer.write(shader)?);
                }
                CompileOutput::Json => {
                    let Some(reflection) = &result.reflection else {
                        return Err(anyhow!("no reflection was produced"));
                    };
                    let report = CompileReport {
                        entry_points: &result.entry_points,
                        hash_sources: result
                            .hash_sources
                            .iter()
                            .map(|(name, hash)| (name.as_str(), hash.to_string()))
                            .collect(),
                        reflection,
                    };
                    print!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
        }
        Commands::Preprocess {
            include,
            define,
            shader,
        } => {
            let mut manager = ShaderSourceManager::with_lookup_directories(include);
            let file = manager.load_shader_source(&shader)?;
            let text =
                shadermix::preprocess::preprocess(&file, manager.lookup_directories(), &define)?;
            print!("{text}");
        }
    }

    Ok(())
}
