use std::collections::HashMap;

use crate::types::SensorReading;

pub trait SensorStore {
    fn read_value(&self, entity_id: &str) -> Option<SensorReading>;
}

impl SensorStore for HashMap<String, SensorReading> {
    fn read_value(&self, entity_id: &str) -> Option<SensorReading> {
        self.get(entity_id).cloned()
    }
}
