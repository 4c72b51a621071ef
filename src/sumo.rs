//! The SUMO toolchain as a [`BatchRunner`].
//!
//! Every batch generates fresh random trips on the input map, routes them,
//! refreshes the continuous rerouters and runs `sumo` with FCD output enabled.

use crate::accumulate::BatchRunner;
use crate::config::RunSettings;
use crate::error::SimulatorError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

pub const SUMO_CONFIG_FILE: &str = "custom.sumocfg";
pub const ROUTE_FILE: &str = "osm.rou.xml";
pub const REROUTER_FILE: &str = "rerouter.add.xml";

/// One external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

pub fn trip_file(batch: usize) -> String {
    format!("trip_{batch}.xml")
}

pub fn fcd_file(batch: usize) -> String {
    format!("mobility_{batch}.xml")
}

/// Runs the SUMO tools for each batch inside a working directory.
#[derive(Debug, Clone)]
pub struct SumoBatchRunner {
    settings: RunSettings,
}

impl SumoBatchRunner {
    /// Prepares the working and output directories and writes the SUMO config.
    ///
    /// The tools run inside `work_dir`, so the map path is made absolute first.
    pub fn new(mut settings: RunSettings) -> Result<Self, SimulatorError> {
        settings.input_map = std::path::absolute(&settings.input_map)?;
        std::fs::create_dir_all(&settings.tools.work_dir)?;
        std::fs::create_dir_all(&settings.output.directory)?;
        let config_path = settings.tools.work_dir.join(SUMO_CONFIG_FILE);
        std::fs::write(&config_path, sumo_config(&settings))?;
        debug!(path = %config_path.display(), "wrote SUMO configuration");
        Ok(Self { settings })
    }

    fn map(&self) -> String {
        self.settings.input_map.display().to_string()
    }

    fn duration(&self) -> String {
        self.settings.window.trip_duration().to_string()
    }

    pub fn trip_generation(&self, batch: usize) -> Invocation {
        let tools = &self.settings.tools;
        let probability = 1.0 / f64::from(self.settings.batch_size);
        let mut invocation = Invocation::new(&tools.random_trips, &["-n"])
            .arg(self.map())
            .arg("-o")
            .arg(trip_file(batch))
            .arg("-b")
            .arg("0")
            .arg("-e")
            .arg("1")
            .arg("-p")
            .arg(probability.to_string());
        if tools.pedestrians {
            invocation = invocation.arg("--pedestrians");
        }
        match self.settings.seed {
            Some(seed) => invocation.arg("--seed").arg((seed + batch as u64).to_string()),
            None => invocation.arg("--random"),
        }
    }

    pub fn routing(&self, batch: usize) -> Invocation {
        Invocation::new(&self.settings.tools.duarouter, &["-n"])
            .arg(self.map())
            .arg("--route-files")
            .arg(trip_file(batch))
            .arg("-o")
            .arg(ROUTE_FILE)
            .arg("-e")
            .arg(self.duration())
    }

    pub fn rerouters(&self) -> Invocation {
        Invocation::new(&self.settings.tools.rerouters, &["-n"])
            .arg(self.map())
            .arg("-o")
            .arg(REROUTER_FILE)
            .arg("-e")
            .arg(self.duration())
    }

    pub fn simulation(&self, batch: usize) -> Invocation {
        Invocation::new(&self.settings.tools.sumo, &["-c", SUMO_CONFIG_FILE])
            .arg("--step-length")
            .arg(self.settings.window.time_step().to_string())
            .arg("--fcd-output")
            .arg(fcd_file(batch))
    }

    fn execute(&self, invocation: &Invocation) -> Result<(), SimulatorError> {
        debug!(program = %invocation.program, args = ?invocation.args, "running");
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&self.settings.tools.work_dir)
            .status()
            .map_err(|source| SimulatorError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(SimulatorError::Failed {
                program: invocation.program.clone(),
                status,
            });
        }
        Ok(())
    }

    /// Moves a produced artifact from the working directory to the output directory.
    fn collect(&self, name: &str) -> Result<PathBuf, SimulatorError> {
        let from = self.settings.tools.work_dir.join(name);
        if !from.is_file() {
            return Err(SimulatorError::MissingOutput { path: from });
        }
        let to = self.settings.output.directory.join(name);
        move_file(&from, &to)?;
        Ok(to)
    }
}

impl BatchRunner for SumoBatchRunner {
    fn run_batch(&mut self, batch_index: usize) -> Result<PathBuf, SimulatorError> {
        info!(batch = batch_index, "simulating batch");
        self.execute(&self.trip_generation(batch_index))?;
        self.execute(&self.routing(batch_index))?;
        self.execute(&self.rerouters())?;
        self.execute(&self.simulation(batch_index))?;

        self.collect(&trip_file(batch_index))?;
        self.collect(&fcd_file(batch_index))
    }
}

fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if std::fs::rename(from, to).is_err() {
        // Cross-device moves cannot rename.
        std::fs::copy(from, to)?;
        std::fs::remove_file(from)?;
    }
    Ok(())
}

/// The `.sumocfg` shared by all batches.
pub fn sumo_config(settings: &RunSettings) -> String {
    let mut out = String::new();
    out.push_str("<configuration>\n");
    out.push_str("\t<input>\n");
    out.push_str(&format!(
        "\t\t<net-file value=\"{}\"/>\n",
        settings.input_map.display()
    ));
    out.push_str(&format!("\t\t<route-files value=\"{ROUTE_FILE}\"/>\n"));
    out.push_str(&format!(
        "\t\t<additional-files value=\"{REROUTER_FILE}\"/>\n"
    ));
    out.push_str("\t</input>\n");
    out.push_str("\t<time>\n");
    out.push_str("\t\t<begin value=\"0\"/>\n");
    out.push_str(&format!(
        "\t\t<end value=\"{}\"/>\n",
        settings.window.trip_duration()
    ));
    out.push_str("\t</time>\n");
    out.push_str("\t<output>\n");
    out.push_str("\t\t<fcd-output value=\"custom.output.xml\"/>\n");
    out.push_str("\t</output>\n");
    out.push_str("</configuration>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;

    fn settings(dir: &Path) -> RunSettings {
        let mut config = GeneratorConfig::default();
        config.simulation.input_map = Some(PathBuf::from("osm.net.xml"));
        config.simulation.trip_duration = 60.0;
        config.simulation.time_step = 0.1;
        config.simulation.batch_size = 50;
        config.tools.work_dir = dir.join("work");
        config.output.directory = dir.join("out");
        config.validate().unwrap()
    }

    fn args(invocation: &Invocation) -> Vec<&str> {
        invocation.args.iter().map(String::as_str).collect()
    }

    fn absolute_map() -> String {
        std::env::current_dir()
            .unwrap()
            .join("osm.net.xml")
            .display()
            .to_string()
    }

    #[test]
    fn test_new_writes_sumo_config() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SumoBatchRunner::new(settings(dir.path())).unwrap();
        let written =
            std::fs::read_to_string(dir.path().join("work").join(SUMO_CONFIG_FILE)).unwrap();
        assert_eq!(written, sumo_config(&runner.settings));
        assert!(written.contains(&format!("<net-file value=\"{}\"/>", absolute_map())));
        assert!(written.contains("<end value=\"60\"/>"));
        assert!(dir.path().join("out").is_dir());
    }

    #[test]
    fn test_trip_generation_command() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SumoBatchRunner::new(settings(dir.path())).unwrap();
        let invocation = runner.trip_generation(3);
        let map = absolute_map();
        assert_eq!(invocation.program, "randomTrips.py");
        assert_eq!(
            args(&invocation),
            vec![
                "-n", map.as_str(), "-o", "trip_3.xml", "-b", "0", "-e", "1", "-p", "0.02",
                "--pedestrians", "--random"
            ]
        );
    }

    #[test]
    fn test_seeded_trip_generation() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.seed = Some(40);
        settings.tools.pedestrians = false;
        let runner = SumoBatchRunner::new(settings).unwrap();
        let invocation = runner.trip_generation(2);
        let args = args(&invocation);
        assert!(!args.contains(&"--pedestrians"));
        assert_eq!(&args[args.len() - 2..], &["--seed", "42"]);
    }

    #[test]
    fn test_routing_and_simulation_commands() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SumoBatchRunner::new(settings(dir.path())).unwrap();
        let map = absolute_map();
        assert_eq!(
            args(&runner.routing(1)),
            vec!["-n", map.as_str(), "--route-files", "trip_1.xml", "-o", "osm.rou.xml", "-e", "60"]
        );
        assert_eq!(
            args(&runner.rerouters()),
            vec!["-n", map.as_str(), "-o", "rerouter.add.xml", "-e", "60"]
        );
        assert_eq!(
            args(&runner.simulation(1)),
            vec!["-c", "custom.sumocfg", "--step-length", "0.1", "--fcd-output", "mobility_1.xml"]
        );
    }

    #[test]
    fn test_relative_map_resolves_outside_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        assert!(settings.input_map.is_relative());
        assert_ne!(settings.tools.work_dir, PathBuf::from("."));

        let runner = SumoBatchRunner::new(settings).unwrap();
        let expected = std::env::current_dir().unwrap().join("osm.net.xml");
        assert_eq!(runner.settings.input_map, expected);
        assert_eq!(runner.routing(0).args[1], expected.display().to_string());

        let written =
            std::fs::read_to_string(dir.path().join("work").join(SUMO_CONFIG_FILE)).unwrap();
        assert!(written.contains(&format!("<net-file value=\"{}\"/>", expected.display())));
    }

    #[test]
    fn test_absolute_map_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        let map = dir.path().join("maps").join("city.net.xml");
        settings.input_map = map.clone();
        let runner = SumoBatchRunner::new(settings).unwrap();
        assert_eq!(runner.settings.input_map, map);
    }

    #[test]
    fn test_missing_program_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.tools.random_trips = "mobgen-no-such-tool".to_string();
        let mut runner = SumoBatchRunner::new(settings).unwrap();
        assert!(matches!(
            runner.run_batch(0),
            Err(SimulatorError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_silent_tools_report_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.tools.random_trips = "true".to_string();
        settings.tools.duarouter = "true".to_string();
        settings.tools.rerouters = "true".to_string();
        settings.tools.sumo = "true".to_string();
        let mut runner = SumoBatchRunner::new(settings).unwrap();
        match runner.run_batch(0) {
            Err(SimulatorError::MissingOutput { path }) => {
                assert!(path.ends_with("trip_0.xml"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_tool_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.tools.random_trips = "false".to_string();
        let mut runner = SumoBatchRunner::new(settings).unwrap();
        assert!(matches!(
            runner.run_batch(0),
            Err(SimulatorError::Failed { program, .. }) if program == "false"
        ));
    }
}
