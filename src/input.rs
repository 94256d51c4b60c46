use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use winit::event::MouseButton;
use winit::keyboard::{Key, NamedKey};

/// Polled keyboard/pointer state for one view.
pub struct Input {
    bindings: InputBindings,
    pub mouse_delta: (f32, f32),
    forward_held: bool,
    backward_held: bool,
    left_held: bool,
    right_held: bool,
    ascend_held: bool,
    descend_held: bool,
    boost_held: bool,
    refresh_pressed: bool,
    look_pressed: bool,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(path: impl AsRef<Path>) -> Self {
        let bindings = InputBindings::load_or_default(path);
        Self::with_bindings(bindings)
    }

    fn with_bindings(bindings: InputBindings) -> Self {
        Self {
            bindings,
            mouse_delta: (0.0, 0.0),
            forward_held: false,
            backward_held: false,
            left_held: false,
            right_held: false,
            ascend_held: false,
            descend_held: false,
            boost_held: false,
            refresh_pressed: false,
            look_pressed: false,
        }
    }

    pub fn push(&mut self, ev: InputEvent) {
        match ev {
            InputEvent::Key { key, pressed } => self.apply_key_binding(&key, pressed),
            InputEvent::MouseMove { dx, dy } => {
                self.mouse_delta.0 += dx;
                self.mouse_delta.1 += dy;
            }
            InputEvent::MouseButton { button: MouseButton::Right, pressed } => self.look_pressed = pressed,
            InputEvent::MouseButton { .. } => {}
        }
    }

    /// Drops per-frame deltas; held state survives.
    pub fn clear_frame(&mut self) {
        self.mouse_delta = (0.0, 0.0);
        self.refresh_pressed = false;
    }

    pub fn take_refresh_pressed(&mut self) -> bool {
        let v = self.refresh_pressed;
        self.refresh_pressed = false;
        v
    }

    /// Right button held: pointer deltas turn the camera.
    pub fn look_held(&self) -> bool {
        self.look_pressed
    }
    pub fn freefly_forward(&self) -> bool {
        self.forward_held
    }
    pub fn freefly_backward(&self) -> bool {
        self.backward_held
    }
    pub fn freefly_left(&self) -> bool {
        self.left_held
    }
    pub fn freefly_right(&self) -> bool {
        self.right_held
    }
    pub fn freefly_ascend(&self) -> bool {
        self.ascend_held
    }
    pub fn freefly_descend(&self) -> bool {
        self.descend_held
    }
    pub fn freefly_boost(&self) -> bool {
        self.boost_held
    }

    fn apply_key_binding(&mut self, key: &Key, pressed: bool) {
        if let Some(binding_key) = InputKeyBinding::from_event_key(key) {
            let actions: Vec<_> = self.bindings.actions_for_key(&binding_key).collect();
            for action in actions {
                self.update_action_state(action, pressed);
            }
        }
    }

    fn update_action_state(&mut self, action: InputAction, pressed: bool) {
        match action {
            InputAction::RefreshView => {
                if pressed {
                    self.refresh_pressed = true;
                }
            }
            InputAction::FreeflyForward => self.forward_held = pressed,
            InputAction::FreeflyBackward => self.backward_held = pressed,
            InputAction::FreeflyLeft => self.left_held = pressed,
            InputAction::FreeflyRight => self.right_held = pressed,
            InputAction::FreeflyAscend => self.ascend_held = pressed,
            InputAction::FreeflyDescend => self.descend_held = pressed,
            InputAction::FreeflyBoost => self.boost_held = pressed,
        }
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::with_bindings(InputBindings::default())
    }
}

#[derive(Debug, Clone)]
struct InputBindings {
    key_to_actions: HashMap<InputKeyBinding, Vec<InputAction>>,
}

impl InputBindings {
    fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<InputConfigFile>(&contents) {
                Ok(config) => Self::from_config(config, &path.display().to_string()),
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "failed to parse input bindings, using defaults");
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "failed to read input bindings, using defaults");
                Self::default()
            }
        }
    }

    fn from_config(config: InputConfigFile, origin: &str) -> Self {
        let overrides = config.into_overrides(origin);
        Self::with_overrides(overrides)
    }

    fn with_overrides(overrides: HashMap<InputAction, Vec<InputKeyBinding>>) -> Self {
        let mut action_map = Self::default_action_map();
        for (action, keys) in overrides {
            if keys.is_empty() {
                continue;
            }
            action_map.insert(action, keys);
        }
        Self::from_action_map(action_map)
    }

    fn default_action_map() -> HashMap<InputAction, Vec<InputKeyBinding>> {
        use InputAction::*;
        let mut map = HashMap::new();
        map.insert(RefreshView, vec![InputKeyBinding::character("r")]);
        map.insert(FreeflyForward, vec![InputKeyBinding::character("w")]);
        map.insert(FreeflyBackward, vec![InputKeyBinding::character("s")]);
        map.insert(FreeflyLeft, vec![InputKeyBinding::character("a")]);
        map.insert(FreeflyRight, vec![InputKeyBinding::character("d")]);
        map.insert(FreeflyAscend, vec![InputKeyBinding::character("e")]);
        map.insert(FreeflyDescend, vec![InputKeyBinding::character("q")]);
        map.insert(FreeflyBoost, vec![InputKeyBinding::named(NamedKeyCode::Shift)]);
        map
    }

    fn from_action_map(action_map: HashMap<InputAction, Vec<InputKeyBinding>>) -> Self {
        let mut key_to_actions: HashMap<InputKeyBinding, Vec<InputAction>> = HashMap::new();
        for (action, keys) in action_map {
            for key in keys {
                key_to_actions.entry(key).or_default().push(action);
            }
        }
        Self { key_to_actions }
    }

    fn actions_for_key(&self, key: &InputKeyBinding) -> impl Iterator<Item = InputAction> + '_ {
        self.key_to_actions.get(key).into_iter().flatten().copied()
    }
}

impl Default for InputBindings {
    fn default() -> Self {
        Self::from_action_map(Self::default_action_map())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum InputKeyBinding {
    Character(String),
    Named(NamedKeyCode),
}

impl InputKeyBinding {
    fn character(ch: &str) -> Self {
        Self::Character(ch.to_lowercase())
    }

    fn named(named: NamedKeyCode) -> Self {
        Self::Named(named)
    }

    fn from_event_key(key: &Key) -> Option<Self> {
        match key {
            Key::Character(ch) => {
                let s = ch.to_string();
                if s.is_empty() {
                    None
                } else {
                    Some(Self::Character(s.to_lowercase()))
                }
            }
            Key::Named(named) => NamedKeyCode::from_named_key(named).map(Self::Named),
            _ => None,
        }
    }

    fn from_config_value(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        if let Some(named) = NamedKeyCode::from_str(&normalized) {
            return Some(Self::Named(named));
        }
        if normalized.chars().count() == 1 {
            return Some(Self::Character(normalized));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NamedKeyCode {
    Shift,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
}

impl NamedKeyCode {
    fn from_named_key(key: &NamedKey) -> Option<Self> {
        match key {
            NamedKey::Shift => Some(Self::Shift),
            NamedKey::ArrowUp => Some(Self::ArrowUp),
            NamedKey::ArrowDown => Some(Self::ArrowDown),
            NamedKey::ArrowLeft => Some(Self::ArrowLeft),
            NamedKey::ArrowRight => Some(Self::ArrowRight),
            _ => None,
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "shift" | "left_shift" | "right_shift" => Some(Self::Shift),
            "up" | "arrow_up" => Some(Self::ArrowUp),
            "down" | "arrow_down" => Some(Self::ArrowDown),
            "left" | "arrow_left" => Some(Self::ArrowLeft),
            "right" | "arrow_right" => Some(Self::ArrowRight),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum InputAction {
    RefreshView,
    FreeflyForward,
    FreeflyBackward,
    FreeflyLeft,
    FreeflyRight,
    FreeflyAscend,
    FreeflyDescend,
    FreeflyBoost,
}

impl InputAction {
    fn from_str(value: &str) -> Option<Self> {
        match value {
            "refresh_view" => Some(Self::RefreshView),
            "freefly_forward" => Some(Self::FreeflyForward),
            "freefly_backward" => Some(Self::FreeflyBackward),
            "freefly_left" => Some(Self::FreeflyLeft),
            "freefly_right" => Some(Self::FreeflyRight),
            "freefly_ascend" => Some(Self::FreeflyAscend),
            "freefly_descend" => Some(Self::FreeflyDescend),
            "freefly_boost" => Some(Self::FreeflyBoost),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InputConfigFile {
    #[serde(default)]
    bindings: HashMap<String, Vec<String>>,
}

impl InputConfigFile {
    fn into_overrides(self, origin: &str) -> HashMap<InputAction, Vec<InputKeyBinding>> {
        let mut overrides = HashMap::new();
        for (action_name, keys) in self.bindings {
            let action_key = action_name.trim().to_lowercase();
            match InputAction::from_str(&action_key) {
                Some(action) => {
                    let mut parsed = Vec::new();
                    for key in keys {
                        match InputKeyBinding::from_config_value(&key) {
                            Some(binding) => parsed.push(binding),
                            None => tracing::warn!(%origin, %key, action = %action_name, "unknown key, ignoring"),
                        }
                    }
                    if parsed.is_empty() {
                        tracing::warn!(%origin, action = %action_name, "action has no valid keys, keeping defaults");
                        continue;
                    }
                    overrides.insert(action, parsed);
                }
                None => tracing::warn!(%origin, action = %action_name, "unknown action, ignoring"),
            }
        }
        overrides
    }
}

pub enum InputEvent {
    Key { key: Key, pressed: bool },
    MouseMove { dx: f32, dy: f32 },
    MouseButton { button: MouseButton, pressed: bool },
}

impl InputEvent {
    pub fn key_char(ch: &str, pressed: bool) -> Self {
        InputEvent::Key { key: Key::Character(ch.into()), pressed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_keys_track_press_and_release() {
        let mut input = Input::new();
        input.push(InputEvent::key_char("w", true));
        assert!(input.freefly_forward());
        input.clear_frame();
        assert!(input.freefly_forward(), "held state survives frame clears");
        input.push(InputEvent::key_char("W", false));
        assert!(!input.freefly_forward(), "uppercase release matches lowercase binding");
    }

    #[test]
    fn right_drag_enables_look_and_deltas_reset_per_frame() {
        let mut input = Input::new();
        input.push(InputEvent::key_char("d", true));
        input.push(InputEvent::MouseButton { button: MouseButton::Right, pressed: true });
        input.push(InputEvent::MouseMove { dx: 3.0, dy: -1.0 });
        assert!(input.look_held());
        assert!(input.freefly_right(), "strafing and looking are independent");
        assert_eq!(input.mouse_delta, (3.0, -1.0));
        input.clear_frame();
        assert_eq!(input.mouse_delta, (0.0, 0.0));
        input.push(InputEvent::MouseButton { button: MouseButton::Right, pressed: false });
        assert!(!input.look_held());
    }

    #[test]
    fn config_values_parse_named_keys() {
        assert_eq!(InputKeyBinding::from_config_value("Left_Shift"), Some(InputKeyBinding::Named(NamedKeyCode::Shift)));
        assert_eq!(InputKeyBinding::from_config_value("k"), Some(InputKeyBinding::Character("k".into())));
        assert_eq!(InputKeyBinding::from_config_value("kk"), None);
    }
}
