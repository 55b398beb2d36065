//! Sensor metadata catalog.
//!
//! The catalog is read-only input supplied by an external metadata service
//! (or, in the service binary, by the `[[sensors]]` config section). Nothing
//! in the ingestion path writes to it.

use std::collections::HashMap;

use gwlive_types::SensorMetadata;

/// Lookup table of [`SensorMetadata`] keyed by sensor id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    sensors: HashMap<String, SensorMetadata>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry, returning the previous one.
    pub fn insert(&mut self, metadata: SensorMetadata) -> Option<SensorMetadata> {
        self.sensors.insert(metadata.sensor_id.clone(), metadata)
    }

    /// Look up metadata for a sensor.
    pub fn get(&self, sensor_id: &str) -> Option<&SensorMetadata> {
        self.sensors.get(sensor_id)
    }

    /// Whether the catalog knows the sensor.
    pub fn contains(&self, sensor_id: &str) -> bool {
        self.sensors.contains_key(sensor_id)
    }

    /// Display name for a sensor, falling back to its id.
    pub fn display_name<'a>(&'a self, sensor_id: &'a str) -> &'a str {
        self.get(sensor_id).map_or(sensor_id, |m| m.name.as_str())
    }

    /// Iterate over all entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &SensorMetadata> {
        self.sensors.values()
    }

    /// Catalogued sensor ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.sensors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl FromIterator<SensorMetadata> for Catalog {
    fn from_iter<I: IntoIterator<Item = SensorMetadata>>(iter: I) -> Self {
        let mut catalog = Catalog::new();
        for metadata in iter {
            catalog.insert(metadata);
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwlive_types::SensorType;

    #[test]
    fn test_catalog_lookup() {
        let catalog: Catalog = [
            SensorMetadata::new("p1", "Pump pressure", SensorType::Analog, 0.0, 10.0),
            SensorMetadata::new("v1", "Inlet valve", SensorType::Digital, 0.0, 1.0),
        ]
        .into_iter()
        .collect();

        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("p1"));
        assert_eq!(catalog.get("v1").unwrap().kind, SensorType::Digital);
        assert_eq!(catalog.ids(), vec!["p1", "v1"]);
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let mut catalog = Catalog::new();
        catalog.insert(SensorMetadata::new(
            "t1",
            "Oven",
            SensorType::Analog,
            0.0,
            300.0,
        ));
        assert_eq!(catalog.display_name("t1"), "Oven");
        assert_eq!(catalog.display_name("t9"), "t9");
    }

    #[test]
    fn test_insert_replaces() {
        let mut catalog = Catalog::new();
        catalog.insert(SensorMetadata::new("a", "Old", SensorType::Analog, 0.0, 1.0));
        let previous =
            catalog.insert(SensorMetadata::new("a", "New", SensorType::Analog, 0.0, 1.0));
        assert_eq!(previous.unwrap().name, "Old");
        assert_eq!(catalog.display_name("a"), "New");
    }
}
