#![forbid(unsafe_code)]

//! Signal emissions, callbacks, and connection flags.
//!
//! # Design
//!
//! An [`Emission`] is what an emitter hands to each subscriber: the signal
//! name, the sender's identity, a type-erased payload, and an optional bound
//! receiver (`this`). Emitters always emit with no receiver; managers rebind
//! the emission to the subscriber's chosen receiver before invoking the user
//! callback.
//!
//! A [`Callback`] is a shared closure compared by **pointer identity**.
//! Cloning a callback keeps its identity, so a component can hold one clone
//! and later pass it back to `disconnect` to select exactly the
//! subscriptions that used it.
//!
//! # Flags
//!
//! [`ConnectFlags`] replaces the bare-number calling convention. Only
//! [`ConnectFlags::AFTER`] is supported; [`ConnectFlags::SWAPPED`] exists so
//! that requesting swapped argument order can be rejected explicitly. Wrap
//! the callback in a forwarding closure instead.

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::ScopeError;
use crate::identity::ObjectId;

/// One signal delivery.
pub struct Emission<'a> {
    signal: &'a str,
    sender: ObjectId,
    payload: &'a dyn Any,
    this: Option<Rc<dyn Any>>,
}

impl<'a> Emission<'a> {
    /// Create an unbound emission.
    #[must_use]
    pub fn new(signal: &'a str, sender: ObjectId, payload: &'a dyn Any) -> Self {
        Self {
            signal,
            sender,
            payload,
            this: None,
        }
    }

    /// Same delivery, bound to a different receiver.
    #[must_use]
    pub fn rebind(&self, this: Option<Rc<dyn Any>>) -> Emission<'a> {
        Emission {
            signal: self.signal,
            sender: self.sender,
            payload: self.payload,
            this,
        }
    }

    #[inline]
    #[must_use]
    pub fn signal(&self) -> &'a str {
        self.signal
    }

    #[inline]
    #[must_use]
    pub fn sender(&self) -> ObjectId {
        self.sender
    }

    /// Downcast the payload.
    #[must_use]
    pub fn payload<T: Any>(&self) -> Option<&'a T> {
        self.payload.downcast_ref::<T>()
    }

    /// The bound receiver, if it is still alive.
    #[must_use]
    pub fn this(&self) -> Option<&Rc<dyn Any>> {
        self.this.as_ref()
    }

    /// The bound receiver downcast to a concrete type.
    #[must_use]
    pub fn this_as<T: Any>(&self) -> Option<Rc<T>> {
        self.this.clone()?.downcast::<T>().ok()
    }
}

impl fmt::Debug for Emission<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emission")
            .field("signal", &self.signal)
            .field("sender", &self.sender)
            .field("bound", &self.this.is_some())
            .finish_non_exhaustive()
    }
}

/// Adapter-level handler. This is what [`crate::Subscribable::subscribe`]
/// receives.
pub type Handler = Rc<dyn Fn(&Emission<'_>)>;

/// User callback with pointer identity.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&Emission<'_>)>);

impl Callback {
    pub fn new(f: impl Fn(&Emission<'_>) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke the callback directly.
    pub fn call(&self, emission: &Emission<'_>) {
        (self.0)(emission);
    }

    /// Whether both handles refer to the same closure.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }

    /// Unbound adapter handler sharing this callback's closure.
    #[must_use]
    pub fn handler(&self) -> Handler {
        Rc::clone(&self.0)
    }

    /// Adapter handler that rebinds every emission to `bound` before calling
    /// through. A receiver that has been dropped is delivered as `None`.
    #[must_use]
    pub fn bound_to(&self, bound: Option<Weak<dyn Any>>) -> Handler {
        let Some(bound) = bound else {
            return self.handler();
        };
        let callback = self.clone();
        Rc::new(move |emission: &Emission<'_>| {
            callback.call(&emission.rebind(bound.upgrade()));
        })
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Callback {}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

bitflags::bitflags! {
    /// Connection flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConnectFlags: u32 {
        /// Run after the emitter's default handlers.
        const AFTER = 1 << 0;
        /// Swapped receiver/sender argument order. Always rejected.
        const SWAPPED = 1 << 1;
    }
}

impl Default for ConnectFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl ConnectFlags {
    /// Every flag a subscription may carry.
    pub const SUPPORTED: Self = Self::AFTER;

    /// Check the flags against [`Self::SUPPORTED`].
    ///
    /// # Errors
    ///
    /// [`ScopeError::SwappedArguments`] when `SWAPPED` is set,
    /// [`ScopeError::UnsupportedFlags`] for any other bit outside the
    /// supported set.
    pub fn validate(self, signal: &str) -> Result<Self, ScopeError> {
        if self.contains(Self::SWAPPED) {
            return Err(ScopeError::SwappedArguments {
                signal: signal.to_owned(),
            });
        }
        if !Self::SUPPORTED.contains(self) {
            return Err(ScopeError::UnsupportedFlags {
                signal: signal.to_owned(),
                bits: self.bits(),
            });
        }
        Ok(self)
    }

    /// Validate a raw flag word, including bits this crate does not name.
    ///
    /// # Errors
    ///
    /// Same as [`Self::validate`].
    pub fn from_raw(bits: u32, signal: &str) -> Result<Self, ScopeError> {
        Self::from_bits_retain(bits).validate(signal)
    }
}

/// Result of a timer callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerFlow {
    /// Keep the source scheduled.
    Continue,
    /// Remove the source.
    Break,
}

impl TimerFlow {
    #[inline]
    #[must_use]
    pub const fn is_continue(self) -> bool {
        matches!(self, Self::Continue)
    }
}

impl From<bool> for TimerFlow {
    fn from(keep: bool) -> Self {
        if keep { Self::Continue } else { Self::Break }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn callback_identity_survives_clone() {
        let a = Callback::new(|_| {});
        let b = a.clone();
        let c = Callback::new(|_| {});
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn payload_downcast() {
        let value = 42u32;
        let e = Emission::new("changed", ObjectId::next(), &value);
        assert_eq!(e.payload::<u32>(), Some(&42));
        assert_eq!(e.payload::<i64>(), None);
        assert_eq!(e.signal(), "changed");
    }

    #[test]
    fn bound_handler_delivers_receiver() {
        let receiver: Rc<String> = Rc::new("applet".to_owned());
        let seen = Rc::new(Cell::new(false));
        let seen_in = Rc::clone(&seen);
        let cb = Callback::new(move |e| {
            seen_in.set(e.this_as::<String>().is_some_and(|s| s.as_str() == "applet"));
        });
        let weak: Weak<dyn Any> = Rc::downgrade(&receiver) as Weak<dyn Any>;
        let handler = cb.bound_to(Some(weak));
        handler(&Emission::new("x", ObjectId::next(), &()));
        assert!(seen.get());
    }

    #[test]
    fn bound_handler_with_dropped_receiver_is_unbound() {
        let receiver: Rc<u8> = Rc::new(1);
        let weak: Weak<dyn Any> = Rc::downgrade(&receiver) as Weak<dyn Any>;
        drop(receiver);
        let bound = Rc::new(Cell::new(true));
        let bound_in = Rc::clone(&bound);
        let handler = Callback::new(move |e| bound_in.set(e.this().is_some())).bound_to(Some(weak));
        handler(&Emission::new("x", ObjectId::next(), &()));
        assert!(!bound.get());
    }

    #[test]
    fn after_is_supported() {
        assert_eq!(
            ConnectFlags::AFTER.validate("sig"),
            Ok(ConnectFlags::AFTER)
        );
        assert_eq!(
            ConnectFlags::empty().validate("sig"),
            Ok(ConnectFlags::empty())
        );
    }

    #[test]
    fn swapped_is_rejected() {
        let err = (ConnectFlags::AFTER | ConnectFlags::SWAPPED)
            .validate("clicked")
            .unwrap_err();
        assert_eq!(
            err,
            ScopeError::SwappedArguments {
                signal: "clicked".into()
            }
        );
    }

    #[test]
    fn unknown_bits_are_rejected() {
        let err = ConnectFlags::from_raw(1 << 7, "notify").unwrap_err();
        assert!(matches!(err, ScopeError::UnsupportedFlags { bits: 128, .. }));
    }

    #[test]
    fn timer_flow_from_bool() {
        assert_eq!(TimerFlow::from(true), TimerFlow::Continue);
        assert_eq!(TimerFlow::from(false), TimerFlow::Break);
        assert!(TimerFlow::Continue.is_continue());
    }

    mod property {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn raw_flags_accepted_iff_subset_of_supported(bits in any::<u32>()) {
                let accepted = ConnectFlags::from_raw(bits, "sig").is_ok();
                prop_assert_eq!(accepted, bits & !ConnectFlags::SUPPORTED.bits() == 0);
            }
        }
    }
}
