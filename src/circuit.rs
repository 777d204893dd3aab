use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::model::Model;
use crate::reduction::{ReductionConfig, Subcircuit};

/// Stable handle of a component inside its circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub usize);

/// A pin, addressed by its component and its position in that component's pin list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PinRef {
    pub component: ComponentId,
    pub index: usize,
}

impl fmt::Display for PinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.component.0, self.index)
    }
}

/// A named model placed in a circuit
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    /// Pin names captured when the model was added
    pub pins: Vec<String>,
    pub model: Box<dyn Model>,
}

/// Components plus the point-to-point links between their pins.
///
/// Components are stored in insertion order and never removed, so
/// `ComponentId`s stay valid. Each pin joins at most one other pin; pins
/// left unconnected form the circuit's external interface.
#[derive(Debug, Clone)]
pub struct Circuit {
    pub title: String,
    pub config: ReductionConfig,
    components: Vec<Instance>,
    name_map: HashMap<String, ComponentId>,
    /// Edge list in link order; this is the elimination order
    connections: Vec<(PinRef, PinRef)>,
    links: HashMap<PinRef, PinRef>,
    revision: u64,
    cached: Option<(u64, Arc<Subcircuit>)>,
}

impl Circuit {
    pub fn new(title: String) -> Self {
        Self::with_config(title, ReductionConfig::default())
    }

    pub fn with_config(title: String, config: ReductionConfig) -> Self {
        Circuit {
            title,
            config,
            components: Vec::new(),
            name_map: HashMap::new(),
            connections: Vec::new(),
            links: HashMap::new(),
            revision: 0,
            cached: None,
        }
    }

    /// Add a component to the circuit and return its ID
    pub fn add_component<M: Model + 'static>(&mut self, name: &str, model: M) -> Result<ComponentId> {
        self.add_boxed(name, Box::new(model))
    }

    pub fn add_boxed(&mut self, name: &str, model: Box<dyn Model>) -> Result<ComponentId> {
        if self.name_map.contains_key(name) {
            return Err(SimError::DuplicateComponent(name.to_string()));
        }

        let pins = model.pins();
        for (k, pin) in pins.iter().enumerate() {
            if pins[..k].contains(pin) {
                return Err(SimError::Connection {
                    a: format!("{}.{}", name, pin),
                    b: format!("{}.{}", name, pin),
                    reason: "pin names must be unique within a component".to_string(),
                });
            }
        }

        let id = ComponentId(self.components.len());
        self.components.push(Instance {
            name: name.to_string(),
            pins,
            model,
        });
        self.name_map.insert(name.to_string(), id);
        self.touch();
        Ok(id)
    }

    /// Get component by ID
    pub fn component(&self, id: ComponentId) -> Option<&Instance> {
        self.components.get(id.0)
    }

    /// Get component ID by name
    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.name_map.get(name).copied()
    }

    pub fn components(&self) -> impl Iterator<Item = &Instance> {
        self.components.iter()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Mutable access to a component's model; invalidates the cached reduction
    pub fn model_mut(&mut self, id: ComponentId) -> Option<&mut (dyn Model + 'static)> {
        self.touch();
        self.components.get_mut(id.0).map(|instance| instance.model.as_mut())
    }

    /// Resolve `component.pin` names to a pin reference
    pub fn pin(&self, component: &str, pin: &str) -> Result<PinRef> {
        let id = self
            .component_id(component)
            .ok_or_else(|| SimError::UnknownComponent(component.to_string()))?;
        let index = self.components[id.0]
            .pins
            .iter()
            .position(|name| name == pin)
            .ok_or_else(|| SimError::UnknownPin {
                component: component.to_string(),
                pin: pin.to_string(),
            })?;
        Ok(PinRef { component: id, index })
    }

    /// Pin reference by position, without validation
    pub fn pin_at(&self, component: ComponentId, index: usize) -> PinRef {
        PinRef { component, index }
    }

    /// `component.pin` label of a pin
    pub fn pin_label(&self, pin: PinRef) -> String {
        match self.components.get(pin.component.0) {
            Some(instance) => match instance.pins.get(pin.index) {
                Some(name) => format!("{}.{}", instance.name, name),
                None => format!("{}.{}", instance.name, pin.index),
            },
            None => pin.to_string(),
        }
    }

    fn check_pin(&self, pin: PinRef) -> Result<()> {
        let instance = self
            .components
            .get(pin.component.0)
            .ok_or_else(|| SimError::UnknownComponent(pin.component.0.to_string()))?;
        if pin.index >= instance.pins.len() {
            return Err(SimError::UnknownPin {
                component: instance.name.clone(),
                pin: pin.index.to_string(),
            });
        }
        Ok(())
    }

    /// Join two pins
    pub fn connect(&mut self, a: PinRef, b: PinRef) -> Result<()> {
        self.check_pin(a)?;
        self.check_pin(b)?;

        let refuse = |reason: &str| SimError::Connection {
            a: self.pin_label(a),
            b: self.pin_label(b),
            reason: reason.to_string(),
        };

        if a == b {
            return Err(refuse("a pin cannot connect to itself"));
        }
        if let Some(&other) = self.links.get(&a) {
            return Err(refuse(&format!("{} is already connected to {}", self.pin_label(a), self.pin_label(other))));
        }
        if let Some(&other) = self.links.get(&b) {
            return Err(refuse(&format!("{} is already connected to {}", self.pin_label(b), self.pin_label(other))));
        }

        let mode_a = self.components[a.component.0].model.mode();
        let mode_b = self.components[b.component.0].model.mode();
        if mode_a != mode_b {
            return Err(refuse(&format!("incompatible modes {:?} and {:?}", mode_a, mode_b)));
        }

        debug!("Connecting {} to {}", self.pin_label(a), self.pin_label(b));
        self.links.insert(a, b);
        self.links.insert(b, a);
        self.connections.push((a, b));
        self.touch();
        Ok(())
    }

    /// Connect by `component.pin` names
    pub fn connect_names(&mut self, a: (&str, &str), b: (&str, &str)) -> Result<()> {
        let a = self.pin(a.0, a.1)?;
        let b = self.pin(b.0, b.1)?;
        self.connect(a, b)
    }

    /// Break the link of `pin`, if any, and return the pin it was joined to
    pub fn disconnect(&mut self, pin: PinRef) -> Option<PinRef> {
        let other = self.links.remove(&pin)?;
        self.links.remove(&other);
        self.connections
            .retain(|&(a, b)| !((a == pin && b == other) || (a == other && b == pin)));
        self.touch();
        Some(other)
    }

    pub fn is_connected(&self, pin: PinRef) -> bool {
        self.links.contains_key(&pin)
    }

    pub fn connected_to(&self, pin: PinRef) -> Option<PinRef> {
        self.links.get(&pin).copied()
    }

    pub fn connections(&self) -> &[(PinRef, PinRef)] {
        &self.connections
    }

    /// Unconnected pins: components in insertion order, then pin declaration order
    pub fn external_pins(&self) -> Vec<PinRef> {
        self.components
            .iter()
            .enumerate()
            .flat_map(|(c, instance)| {
                (0..instance.pins.len()).map(move |index| PinRef {
                    component: ComponentId(c),
                    index,
                })
            })
            .filter(|pin| !self.links.contains_key(pin))
            .collect()
    }

    /// Redraw the Monte Carlo parameters of every component
    pub fn regenerate_monte_carlo_parameters(&mut self, rng: &mut dyn RngCore) {
        for instance in &mut self.components {
            instance.model.regenerate_monte_carlo_parameters(rng);
        }
        self.touch();
    }

    /// One-shot reduction over a snapshot of the current circuit; never cached
    pub fn subcircuit(&self) -> Subcircuit {
        Subcircuit::new(
            self.title.clone(),
            self.components.clone(),
            &self.connections,
            self.external_pins(),
            self.config.clone(),
        )
    }

    /// The circuit's canonical reduced form, rebuilt only after the circuit changes
    pub fn permanent_subcircuit(&mut self) -> Arc<Subcircuit> {
        if let Some((revision, subcircuit)) = &self.cached {
            if *revision == self.revision {
                return Arc::clone(subcircuit);
            }
        }

        debug!("Rebuilding permanent subcircuit for '{}'", self.title);
        let subcircuit = Arc::new(self.subcircuit());
        self.cached = Some((self.revision, Arc::clone(&subcircuit)));
        subcircuit
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    /// Print circuit summary
    pub fn print_summary(&self) {
        println!("Circuit: {}", self.title);
        println!("Components: {}", self.components.len());
        println!("Connections: {}", self.connections.len());

        let external: Vec<String> = self.external_pins().into_iter().map(|pin| self.pin_label(pin)).collect();
        println!("External pins: {}", external.join(", "));
    }
}
