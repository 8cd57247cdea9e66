use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Source name to bus names. Pure bookkeeping: neither side is validated,
/// buses only exist by being named here.
#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    routes: HashMap<String, BTreeSet<String>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the buses for `source`. An empty list unroutes it.
    pub fn set<I, S>(&mut self, source: &str, buses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let buses: BTreeSet<String> = buses.into_iter().map(Into::into).collect();
        if buses.is_empty() {
            self.routes.remove(source);
        } else {
            self.routes.insert(source.to_string(), buses);
        }
    }

    pub fn get(&self, source: &str) -> Vec<String> {
        self.routes
            .get(source)
            .map(|buses| buses.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn remove(&mut self, source: &str) -> bool {
        self.routes.remove(source).is_some()
    }

    pub fn all(&self) -> BTreeMap<String, Vec<String>> {
        self.routes
            .iter()
            .map(|(source, buses)| (source.clone(), buses.iter().cloned().collect()))
            .collect()
    }

    /// Inverted view: bus name to the sources feeding it.
    pub fn buses(&self) -> BTreeMap<String, Vec<String>> {
        let mut buses: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (source, targets) in &self.routes {
            for bus in targets {
                buses.entry(bus.clone()).or_default().push(source.clone());
            }
        }
        for sources in buses.values_mut() {
            sources.sort();
        }
        buses
    }

    pub fn sources_for_bus(&self, bus: &str) -> Vec<String> {
        let mut sources: Vec<String> = self
            .routes
            .iter()
            .filter(|(_, buses)| buses.contains(bus))
            .map(|(source, _)| source.clone())
            .collect();
        sources.sort();
        sources
    }
}
