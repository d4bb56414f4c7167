use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Type-erased payload attached to an instance.
///
/// Never inspected by the binding or the engine. Equality is identity: two `HostData`
/// compare equal only when they hold the same allocation, or when both are empty.
#[derive(Clone, Default)]
pub struct HostData(Option<Rc<dyn Any>>);

impl HostData {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new<T: Any>(value: T) -> Self {
        Self(Some(Rc::new(value)))
    }

    /// Wraps an existing allocation, so the caller can keep its own reference for identity checks.
    pub fn from_rc<T: Any>(value: Rc<T>) -> Self {
        Self(Some(value))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|value| value.downcast_ref())
    }

    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        self.0.clone().and_then(|value| value.downcast().ok())
    }

    pub fn ptr_eq(&self, other: &HostData) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl PartialEq for HostData {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: Any> From<Rc<T>> for HostData {
    fn from(value: Rc<T>) -> Self {
        Self::from_rc(value)
    }
}

impl fmt::Debug for HostData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(value) => write!(f, "HostData({:p})", Rc::as_ptr(value) as *const ()),
            None => f.write_str("HostData(none)"),
        }
    }
}
