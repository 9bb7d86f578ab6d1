//! Wrapper classes shared by the integration tests.
//!
//! Widget derives from the root object, Button from Widget and ToggleButton
//! from Button, each with its own native type.

#![allow(dead_code)]

use std::sync::OnceLock;

use objbridge::{Object, ObjectType, TypeTag};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn register(slot: &OnceLock<TypeTag>, parent: TypeTag, name: &str, signals: &[&str]) -> TypeTag {
    *slot.get_or_init(|| {
        let tag = TypeTag::register_object(parent, name).expect("type registration should succeed");
        for signal in signals {
            tag.add_signal(signal).expect("add_signal should succeed");
        }
        tag
    })
}

pub struct Widget {
    parent: Object,
}

impl Widget {
    pub fn name(&self) -> &'static str {
        "widget"
    }
}

impl ObjectType for Widget {
    type Parent = Object;

    fn static_type() -> TypeTag {
        static TAG: OnceLock<TypeTag> = OnceLock::new();
        register(
            &TAG,
            TypeTag::object(),
            "TestWidget",
            &["destroy", "size-allocate", "query", "event", "strings", "flags"],
        )
    }

    fn from_parent(parent: Object) -> Self {
        Widget { parent }
    }

    fn parent(&self) -> &Object {
        &self.parent
    }
}

pub struct Button {
    parent: Widget,
}

impl Button {
    pub fn label(&self) -> &'static str {
        "button"
    }
}

impl ObjectType for Button {
    type Parent = Widget;

    fn static_type() -> TypeTag {
        static TAG: OnceLock<TypeTag> = OnceLock::new();
        register(&TAG, Widget::static_type(), "TestButton", &["clicked"])
    }

    fn from_parent(parent: Widget) -> Self {
        Button { parent }
    }

    fn parent(&self) -> &Widget {
        &self.parent
    }
}

pub struct ToggleButton {
    parent: Button,
}

impl ObjectType for ToggleButton {
    type Parent = Button;

    fn static_type() -> TypeTag {
        static TAG: OnceLock<TypeTag> = OnceLock::new();
        register(&TAG, Button::static_type(), "TestToggleButton", &["toggled"])
    }

    fn from_parent(parent: Button) -> Self {
        ToggleButton { parent }
    }

    fn parent(&self) -> &Button {
        &self.parent
    }
}

/// A native type below ToggleButton with no wrapper class of its own.
pub fn check_button_type() -> TypeTag {
    static TAG: OnceLock<TypeTag> = OnceLock::new();
    register(&TAG, ToggleButton::static_type(), "TestCheckButton", &[])
}
