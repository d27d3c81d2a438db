use crate::internal::*;
use tessel_core::layers::*;

/// Creates an unbuilt layer from its class specific configuration.
pub type LayerFromConfig = fn(&serde_json::Value) -> TesselResult<Box<dyn Layer>>;

/// Helper for constructors: `registry.register("Dense", |c| boxed(Dense::from_config(c)))`.
pub fn boxed<L: Layer>(layer: TesselResult<L>) -> TesselResult<Box<dyn Layer>> {
    Ok(Box::new(layer?))
}

/// Maps layer class names to their constructors.
#[derive(Clone, Default)]
pub struct Registry {
    constructors: HashMap<String, LayerFromConfig>,
}

impl Registry {
    /// The layers of `tessel_core::layers`.
    pub fn core() -> Registry {
        let mut reg = Registry::default();
        reg.register("InputLayer", |c| boxed(InputLayer::from_config(c)));
        reg.register("Dense", |c| boxed(Dense::from_config(c)));
        reg.register("Activation", |c| boxed(Activation::from_config(c)));
        reg.register("Dropout", |c| boxed(Dropout::from_config(c)));
        reg.register("Masking", |c| boxed(Masking::from_config(c)));
        reg.register("Embedding", |c| boxed(Embedding::from_config(c)));
        reg.register("Merge", |c| boxed(Merge::from_config(c)));
        reg
    }

    /// Registers a constructor, replacing any previous one for the class.
    pub fn register(&mut self, class_name: impl Into<String>, constructor: LayerFromConfig) {
        let class_name = class_name.into();
        if self.constructors.insert(class_name.clone(), constructor).is_some() {
            debug!("Overriding constructor for {class_name}");
        }
    }

    pub fn with(mut self, class_name: impl Into<String>, constructor: LayerFromConfig) -> Registry {
        self.register(class_name, constructor);
        self
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.constructors.contains_key(class_name)
    }

    pub fn instantiate(
        &self,
        class_name: &str,
        config: &serde_json::Value,
    ) -> TesselResult<Box<dyn Layer>> {
        let Some(constructor) = self.constructors.get(class_name) else {
            bail!(GraphError::UnknownLayerClass { class: class_name.to_string() })
        };
        constructor(config).with_context(|| format!("Instantiating {class_name} from {config}"))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut classes: Vec<&String> = self.constructors.keys().collect();
        classes.sort();
        f.debug_struct("Registry").field("classes", &classes).finish()
    }
}
