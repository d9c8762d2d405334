use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::VehicleDetector;
use super::backends::StubBackend;
use crate::config::DetectorSettings;

/// Named detector backends owned by the hosting layer.
///
/// Backends are wrapped in `Mutex` because `VehicleDetector::detect` takes
/// `&mut self`. A registry can serve several pipelines, one run at a time per
/// backend.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<Mutex<dyn VehicleDetector>>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Build the registry described by `settings`, with its selected
    /// backend as the default.
    pub fn from_settings(settings: &DetectorSettings) -> Result<Self> {
        let mut registry = Self::new();
        match settings.backend.as_str() {
            "stub" => registry.register(StubBackend::new()),
            #[cfg(feature = "backend-tract")]
            "tract" => {
                let mut backend = super::backends::TractBackend::new(
                    &settings.model_path,
                    settings.input_size,
                )?
                .with_nms_threshold(settings.nms_threshold);
                if let Some(path) = &settings.class_names_path {
                    backend = backend.with_class_names_file(path)?;
                }
                registry.register(backend);
            }
            #[cfg(not(feature = "backend-tract"))]
            "tract" => {
                return Err(anyhow!(
                    "detector backend 'tract' requires the backend-tract feature"
                ))
            }
            other => return Err(anyhow!("unknown detector backend '{}'", other)),
        }
        registry.set_default(&settings.backend)?;
        Ok(registry)
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: VehicleDetector + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<Mutex<dyn VehicleDetector>>> {
        self.backends.get(name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Result<Arc<Mutex<dyn VehicleDetector>>> {
        self.default_name
            .as_ref()
            .and_then(|name| self.get(name))
            .ok_or_else(|| anyhow!("no detector backend registered"))
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, VehicleClass};
    use image::RgbImage;

    struct Named(&'static str);

    impl VehicleDetector for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn detect(&mut self, _image: &RgbImage, _t: f32) -> Result<Vec<Detection>> {
            Ok(vec![Detection::new((0.0, 0.0), (2.0, 2.0), 1.0, VehicleClass::Bus)])
        }
    }

    #[test]
    fn first_registered_is_default() {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new());
        registry.register(Named("other"));
        assert_eq!(registry.list(), vec!["other", "stub"]);

        let image = RgbImage::new(2, 2);
        let run = |registry: &BackendRegistry| {
            let backend = registry.default_backend().unwrap();
            let mut detector = backend.lock().unwrap();
            detector.detect(&image, 0.0).unwrap()
        };
        assert!(run(&registry).is_empty());

        registry.set_default("other").unwrap();
        assert_eq!(run(&registry).len(), 1);
        assert!(registry.set_default("missing").is_err());
    }

    #[test]
    fn empty_registry_has_no_default() {
        assert!(BackendRegistry::new().default_backend().is_err());
    }

    #[test]
    fn settings_select_stub() {
        let settings = DetectorSettings {
            backend: "stub".to_string(),
            ..DetectorSettings::default()
        };
        let registry = BackendRegistry::from_settings(&settings).unwrap();
        assert_eq!(registry.list(), vec!["stub"]);

        let settings = DetectorSettings {
            backend: "darknet".to_string(),
            ..DetectorSettings::default()
        };
        assert!(BackendRegistry::from_settings(&settings).is_err());
    }
}
