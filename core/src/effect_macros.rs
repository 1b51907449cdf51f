//! Declarative macros for ergonomic effect construction

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use boxoffice_core::async_effect;
///
/// async_effect! {
///     sink.append(&entry).await.ok()?;
///     None
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::Effect;

    #[derive(Clone, Debug)]
    enum TestAction {
        Persisted { entries: usize },
    }

    #[test]
    fn test_async_effect_macro() {
        let effect = async_effect! {
            Some(TestAction::Persisted { entries: 2 })
        };

        assert!(matches!(effect, Effect::Future(_)));
    }

    #[tokio::test]
    async fn async_effect_yields_feedback_action() {
        let Effect::Future(fut) = async_effect!(Some(TestAction::Persisted { entries: 3 })) else {
            unreachable!("async_effect! always builds a future");
        };
        assert!(matches!(fut.await, Some(TestAction::Persisted { entries: 3 })));
    }
}
