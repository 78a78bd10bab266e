//! Adapters between closures and the memoizer's calling convention

use std::convert::Infallible;

use crate::key::Value;

/// Something a [`crate::Memoized`] can wrap
///
/// The receiver is `None` for plain calls and `Some` for calls made on a
/// value. It is forwarded exactly as the caller passed it.
pub trait Callable {
    /// Value produced by a successful call
    type Output;
    /// Error produced by a failed call; never cached
    type Error;

    /// Invoke the underlying function once
    fn invoke(&self, receiver: Option<&Value>, args: &[Value])
        -> Result<Self::Output, Self::Error>;
}

/// Infallible function that ignores the receiver
#[derive(Debug, Clone, Copy)]
pub struct Function<F>(pub F);

/// Infallible function that takes the receiver as its first parameter
///
/// Calls without a receiver see [`Value::Undefined`].
#[derive(Debug, Clone, Copy)]
pub struct Method<F>(pub F);

/// Fallible function with full access to the receiver
#[derive(Debug, Clone, Copy)]
pub struct Fallible<F>(pub F);

impl<F, R> Callable for Function<F>
where
    F: Fn(&[Value]) -> R,
{
    type Output = R;
    type Error = Infallible;

    fn invoke(&self, _receiver: Option<&Value>, args: &[Value]) -> Result<R, Infallible> {
        Ok((self.0)(args))
    }
}

impl<F, R> Callable for Method<F>
where
    F: Fn(&Value, &[Value]) -> R,
{
    type Output = R;
    type Error = Infallible;

    fn invoke(&self, receiver: Option<&Value>, args: &[Value]) -> Result<R, Infallible> {
        Ok((self.0)(receiver.unwrap_or(&Value::Undefined), args))
    }
}

impl<F, R, E> Callable for Fallible<F>
where
    F: Fn(Option<&Value>, &[Value]) -> Result<R, E>,
{
    type Output = R;
    type Error = E;

    fn invoke(&self, receiver: Option<&Value>, args: &[Value]) -> Result<R, E> {
        (self.0)(receiver, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_ignores_receiver() {
        let f = Function(|args: &[Value]| args.len());
        let this = Value::object(());
        assert_eq!(f.invoke(Some(&this), &[Value::Null]), Ok(1));
    }

    #[test]
    fn test_method_defaults_receiver() {
        let f = Method(|this: &Value, _: &[Value]| this.is_undefined());
        assert_eq!(f.invoke(None, &[]), Ok(true));
        assert_eq!(f.invoke(Some(&Value::Null), &[]), Ok(false));
    }

    #[test]
    fn test_fallible_passes_errors() {
        let f = Fallible(|_: Option<&Value>, args: &[Value]| {
            if args.is_empty() {
                Err("no args")
            } else {
                Ok(args.len())
            }
        });
        assert_eq!(f.invoke(None, &[]), Err("no args"));
        assert_eq!(f.invoke(None, &[Value::from(1)]), Ok(1));
    }
}
