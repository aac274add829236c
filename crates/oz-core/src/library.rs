//! Class registries: name -> immutable class definition lookup.
//!
//! Grounded on `matrix/Library.cc`, which loads `*Class` definitions once
//! at startup and resolves them by name both when spawning new entities
//! and when restoring a save (§4.F: "Restore creates objects by class name
//! lookup, rejects unknown class names").

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::SimError;
use crate::model::{BspModel, EntityClass, FragClass, ObjectClass};

/// Registry of immutable class/asset definitions, looked up by name.
///
/// Definitions are reference-counted (`Arc`) since many live `Struct`s or
/// `Object`s share the same class without needing to own a copy of it.
/// `BotClass`/`VehicleClass` are not separate maps: a bot or vehicle's
/// variant-specific tuning lives inside the shared `ObjectClass` (§3's
/// `ObjectKind` folds the original's `Bot`/`Vehicle` subclasses into one
/// tagged sum over a common base).
#[derive(Default)]
pub struct ClassLibrary {
    bsps: HashMap<String, Arc<BspModel>>,
    entity_classes: HashMap<String, Arc<EntityClass>>,
    object_classes: HashMap<String, Arc<ObjectClass>>,
    frag_classes: HashMap<String, Arc<FragClass>>,
}

impl ClassLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_bsp(&mut self, name: impl Into<String>, bsp: BspModel) {
        self.bsps.insert(name.into(), Arc::new(bsp));
    }

    pub fn bsp(&self, name: &str) -> Result<Arc<BspModel>, SimError> {
        self.bsps
            .get(name)
            .cloned()
            .ok_or_else(|| SimError::AssetNotFound(format!("bsp:{name}")))
    }

    pub fn register_entity_class(&mut self, name: impl Into<String>, class: EntityClass) {
        self.entity_classes.insert(name.into(), Arc::new(class));
    }

    pub fn entity_class(&self, name: &str) -> Result<Arc<EntityClass>, SimError> {
        self.entity_classes
            .get(name)
            .cloned()
            .ok_or_else(|| SimError::AssetNotFound(format!("entity_class:{name}")))
    }

    pub fn register_object_class(&mut self, name: impl Into<String>, class: ObjectClass) {
        self.object_classes.insert(name.into(), Arc::new(class));
    }

    pub fn object_class(&self, name: &str) -> Result<Arc<ObjectClass>, SimError> {
        self.object_classes
            .get(name)
            .cloned()
            .ok_or_else(|| SimError::AssetNotFound(format!("object_class:{name}")))
    }

    pub fn register_frag_class(&mut self, name: impl Into<String>, class: FragClass) {
        self.frag_classes.insert(name.into(), Arc::new(class));
    }

    pub fn frag_class(&self, name: &str) -> Result<Arc<FragClass>, SimError> {
        self.frag_classes
            .get(name)
            .cloned()
            .ok_or_else(|| SimError::AssetNotFound(format!("frag_class:{name}")))
    }

    /// Load a `name -> EntityClass` map from a YAML asset file, merging
    /// into any already-registered classes. Mirrors
    /// `naive-client::project_config`'s "read the file, deserialize with
    /// `#[serde(default)]` fields so future keys don't break old missions"
    /// loader shape, rather than matrix/Library.cc's own binary class-dir
    /// walker (out of scope: we take a single merged document per class
    /// kind, not per-file discovery of an assets tree).
    pub fn load_entity_classes_yaml(&mut self, path: &Path) -> Result<(), SimError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SimError::AssetMalformed(format!("{}: {e}", path.display())))?;
        let classes: HashMap<String, EntityClass> = serde_yaml::from_str(&text)
            .map_err(|e| SimError::AssetMalformed(format!("{}: {e}", path.display())))?;
        for (name, class) in classes {
            self.register_entity_class(name, class);
        }
        Ok(())
    }

    pub fn load_object_classes_yaml(&mut self, path: &Path) -> Result<(), SimError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SimError::AssetMalformed(format!("{}: {e}", path.display())))?;
        let classes: HashMap<String, ObjectClass> = serde_yaml::from_str(&text)
            .map_err(|e| SimError::AssetMalformed(format!("{}: {e}", path.display())))?;
        for (name, class) in classes {
            self.register_object_class(name, class);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectClass;

    #[test]
    fn unknown_class_name_is_asset_not_found() {
        let lib = ClassLibrary::new();
        let err = lib.object_class("does-not-exist").unwrap_err();
        assert!(matches!(err, SimError::AssetNotFound(_)));
    }

    #[test]
    fn registered_class_resolves_by_name() {
        let mut lib = ClassLibrary::new();
        lib.register_object_class("crate", ObjectClass::default());
        assert!(lib.object_class("crate").is_ok());
    }

    #[test]
    fn load_object_classes_yaml_merges_into_the_registry() {
        let path = std::env::temp_dir().join("oz-core-test-object-classes.yaml");
        std::fs::write(&path, "crate:\n  name: crate\n  life: 40.0\n").unwrap();

        let mut lib = ClassLibrary::new();
        lib.load_object_classes_yaml(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let class = lib.object_class("crate").unwrap();
        assert_eq!(class.life, 40.0);
    }
}
