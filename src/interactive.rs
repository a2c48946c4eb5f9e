//! Operator prompts for the location choice and single-sample prediction input

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use crate::domain::Location;
use crate::forecast::{Feature, FeatureStats};

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn say(&mut self, message: impl std::fmt::Display) -> Result<()> {
        writeln!(self.output, "{}", message)?;
        Ok(())
    }

    /// Print `prompt` and read one line, without its line ending
    pub fn ask(&mut self, prompt: &str) -> Result<String> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            bail!("input closed while waiting for: {}", prompt.trim());
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Ask until the operator enters a location between 1 and 4
    pub fn location_choice(&mut self) -> Result<Location> {
        loop {
            self.say("\n=== Choose a location for wind data analysis ===")?;
            for i in Location::MIN..=Location::MAX {
                self.say(format!("{}: Location {}", i, i))?;
            }

            let choice = self.ask(&format!(
                "Enter your choice ({}-{}): ",
                Location::MIN,
                Location::MAX
            ))?;
            match choice.trim().parse::<i64>() {
                Ok(index) => match u8::try_from(index).ok().map(Location::try_from) {
                    Some(Ok(location)) => return Ok(location),
                    _ => self.say(format!(
                        "Error: Please enter a number between {} and {}.",
                        Location::MIN,
                        Location::MAX
                    ))?,
                },
                Err(_) => self.say("Error: Please enter a valid number.")?,
            }
        }
    }

    /// Read one numeric feature value
    pub fn feature(&mut self, feature: Feature) -> Result<f64> {
        let answer = self.ask(&format!("{}: ", feature.label()))?;
        answer
            .trim()
            .parse::<f64>()
            .with_context(|| format!("invalid value '{}' for {}", answer.trim(), feature))
    }

    /// Ask for `feature` until the answer parses; closed input still ends the session
    pub fn feature_until_valid(&mut self, feature: Feature) -> Result<f64> {
        loop {
            let answer = self.ask(&format!("{}: ", feature.label()))?;
            match answer.trim().parse::<f64>() {
                Ok(value) => return Ok(value),
                Err(_) => self.say(format!(
                    "Error: '{}' is not a valid number for {}.",
                    answer.trim(),
                    feature
                ))?,
            }
        }
    }

    /// Read the eight weather fields, then an optional current power (blank = not provided)
    pub fn weather_parameters(&mut self) -> Result<BTreeMap<String, f64>> {
        self.say("\n=== Enter parameters for one-hour ahead prediction ===")?;

        let mut parameters = BTreeMap::new();
        for feature in Feature::weather() {
            let value = self.feature(feature)?;
            parameters.insert(feature.to_string(), value);
        }

        let current_power = self.ask(&format!(
            "\n{} (optional, for persistence model): ",
            Feature::CurrentPower.label()
        ))?;
        if !current_power.trim().is_empty() {
            let value = current_power
                .trim()
                .parse::<f64>()
                .with_context(|| format!("invalid current power '{}'", current_power.trim()))?;
            parameters.insert(Feature::CurrentPower.to_string(), value);
        }

        Ok(parameters)
    }

    pub fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = self.ask(&format!("{} (y/n): ", question))?;
        Ok(answer.trim().eq_ignore_ascii_case("y"))
    }

    pub fn show_feature_overview(&mut self, stats: &[FeatureStats]) -> Result<()> {
        self.say("\nDataset features:")?;
        for stat in stats {
            self.say(stat)?;
        }
        Ok(())
    }
}
