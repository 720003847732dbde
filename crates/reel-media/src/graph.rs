//! Filter graph description types.
//!
//! A [`FilterGraph`] is a list of [`FilterChain`]s. Each chain reads from zero
//! or more labeled pads, applies comma-separated filters and writes to zero or
//! more labeled pads. Rendering joins chains with `;`, which is the syntax of
//! ffmpeg's `-filter_complex`, `-vf` and `-af` arguments.

use std::fmt;

/// One linear chain of filters with explicit pad labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain {
    inputs: Vec<String>,
    filters: Vec<String>,
    outputs: Vec<String>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input pad (`0:v`, `keyed`, ...). Brackets are added on render.
    pub fn input(mut self, pad: impl Into<String>) -> Self {
        self.inputs.push(pad.into());
        self
    }

    /// Append a filter with its arguments (`scale=1920:1080`).
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Add an output pad.
    pub fn output(mut self, pad: impl Into<String>) -> Self {
        self.outputs.push(pad.into());
        self
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pad in &self.inputs {
            write!(f, "[{pad}]")?;
        }
        f.write_str(&self.filters.join(","))?;
        for pad in &self.outputs {
            write!(f, "[{pad}]")?;
        }
        Ok(())
    }
}

/// An ordered set of filter chains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterGraph {
    chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain(mut self, chain: FilterChain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn push(&mut self, chain: FilterChain) {
        self.chains.push(chain);
    }

    pub fn chains(&self) -> &[FilterChain] {
        &self.chains
    }

    /// Every filter in render order.
    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.chains
            .iter()
            .flat_map(|c| c.filters.iter().map(String::as_str))
    }

    /// Index (in render order) of the first stage using filter `name`.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.stages().position(|stage| filter_name(stage) == name)
    }

    /// Index of the last stage using filter `name`.
    pub fn last_position_of(&self, name: &str) -> Option<usize> {
        let stages: Vec<&str> = self.stages().collect();
        stages.iter().rposition(|stage| filter_name(stage) == name)
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chain) in self.chains.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{chain}")?;
        }
        Ok(())
    }
}

/// Filter name of a stage (`scale` for `scale=1920:1080`).
pub fn filter_name(stage: &str) -> &str {
    stage.split_once('=').map_or(stage, |(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_renders_pads_and_filters() {
        let chain = FilterChain::new()
            .input("0:v")
            .filter("scale=1920:1080")
            .filter("setsar=1")
            .output("v0");
        assert_eq!(chain.to_string(), "[0:v]scale=1920:1080,setsar=1[v0]");
    }

    #[test]
    fn test_graph_joins_chains() {
        let graph = FilterGraph::new()
            .chain(FilterChain::new().input("0:v").filter("null").output("a"))
            .chain(FilterChain::new().input("a").filter("hflip"));
        assert_eq!(graph.to_string(), "[0:v]null[a];[a]hflip");
    }

    #[test]
    fn test_padless_chain_renders_plain_filters() {
        let graph = FilterGraph::new().chain(
            FilterChain::new()
                .filter("highpass=f=100")
                .filter("lowpass=f=11000"),
        );
        assert_eq!(graph.to_string(), "highpass=f=100,lowpass=f=11000");
    }

    #[test]
    fn test_stage_positions() {
        let graph = FilterGraph::new()
            .chain(FilterChain::new().filter("highpass=f=100").filter("afftdn=nr=16"))
            .chain(FilterChain::new().filter("highpass=f=100"));
        assert_eq!(graph.position_of("highpass"), Some(0));
        assert_eq!(graph.last_position_of("highpass"), Some(2));
        assert_eq!(graph.position_of("afftdn"), Some(1));
        assert_eq!(graph.position_of("agate"), None);
    }
}
