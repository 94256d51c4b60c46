use lumen_editor::input::{Input, InputEvent};
use std::io::Write;
use tempfile::NamedTempFile;
use winit::keyboard::{Key, NamedKey};

#[test]
fn remapped_refresh_and_flight_keys_override_defaults() {
    let mut temp = NamedTempFile::new().expect("temp input config");
    write!(temp, r#"{{"bindings":{{"refresh_view":["f"],"freefly_forward":["up"]}}}}"#).expect("write remap config");

    let mut input = Input::from_config(temp.path());
    assert!(!input.take_refresh_pressed(), "no events yet");

    input.push(InputEvent::Key { key: Key::Character("f".into()), pressed: true });
    assert!(input.take_refresh_pressed(), "custom key refreshes the view");

    input.push(InputEvent::Key { key: Key::Character("r".into()), pressed: true });
    assert!(!input.take_refresh_pressed(), "default key no longer fires once remapped");

    input.push(InputEvent::Key { key: Key::Named(NamedKey::ArrowUp), pressed: true });
    assert!(input.freefly_forward());
    input.push(InputEvent::Key { key: Key::Character("w".into()), pressed: false });
    assert!(input.freefly_forward(), "releasing the old binding does nothing");

    input.push(InputEvent::Key { key: Key::Character("a".into()), pressed: true });
    assert!(input.freefly_left(), "untouched actions keep their defaults");
}

#[test]
fn unreadable_config_falls_back_to_defaults() {
    let mut temp = NamedTempFile::new().expect("temp input config");
    write!(temp, "not json").expect("write");
    let mut input = Input::from_config(temp.path());
    input.push(InputEvent::key_char("r", true));
    assert!(input.take_refresh_pressed());
    assert!(!input.take_refresh_pressed(), "refresh is edge-triggered");
}
