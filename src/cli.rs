use crate::config::AppConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    width: Option<u32>,
    height: Option<u32>,
    workers: Option<usize>,
    pub ticks: Option<u32>,
    pub config: Option<PathBuf>,
    pub scene: Option<PathBuf>,
    pub script: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            let Some(key) = flag.strip_prefix("--") else {
                bail!("Unexpected argument '{flag}'. Flags take the form --name value.");
            };
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "width" => {
                    overrides.width =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid width '{value}'"))?);
                }
                "height" => {
                    overrides.height =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid height '{value}'"))?);
                }
                "workers" => {
                    overrides.workers =
                        Some(value.parse::<usize>().with_context(|| format!("Invalid worker count '{value}'"))?);
                }
                "ticks" => {
                    overrides.ticks =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid tick count '{value}'"))?);
                }
                "config" => overrides.config = Some(PathBuf::from(value)),
                "scene" => overrides.scene = Some(PathBuf::from(value)),
                "script" => overrides.script = Some(PathBuf::from(value)),
                "output" => overrides.output = Some(PathBuf::from(value)),
                _ => bail!(
                    "Unknown flag '{flag}'. Supported flags: --width, --height, --workers, --ticks, --config, \
                     --scene, --script, --output."
                ),
            }
        }
        Ok(overrides)
    }

    pub fn config_overrides(&self) -> AppConfigOverrides {
        AppConfigOverrides { width: self.width, height: self.height, worker_threads: self.workers }
    }

    #[cfg(test)]
    pub fn as_tuple(&self) -> (Option<u32>, Option<u32>, Option<usize>) {
        (self.width, self.height, self.workers)
    }
}
