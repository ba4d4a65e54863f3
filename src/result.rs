//! Composable success/failure wrapper
//!
//! [`AppResult`] is the return type of every repository-facing operation.
//! Exactly one arm holds a value; combinators preserve that invariant and
//! never panic across the boundary. Side-effect hooks swallow their own
//! failures so they cannot masquerade as operation failures.

use tracing::warn;

use crate::error::AppError;

/// Success-or-typed-failure result used across layer boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppResult<T> {
    Success(T),
    Failure(AppError),
}

impl<T> AppResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, AppResult::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, AppResult::Failure(_))
    }

    /// The success value, if any.
    pub fn ok(self) -> Option<T> {
        match self {
            AppResult::Success(v) => Some(v),
            AppResult::Failure(_) => None,
        }
    }

    /// The error, if any.
    pub fn err(self) -> Option<AppError> {
        match self {
            AppResult::Success(_) => None,
            AppResult::Failure(e) => Some(e),
        }
    }

    /// Transform the success value. A failure passes through unchanged.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AppResult<U> {
        match self {
            AppResult::Success(v) => AppResult::Success(f(v)),
            AppResult::Failure(e) => AppResult::Failure(e),
        }
    }

    /// Transform the success value with a fallible function. The
    /// transform's error degrades the result to a failure via the standard
    /// converter instead of escaping.
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> AppResult<U>
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        match self {
            AppResult::Success(v) => match f(v) {
                Ok(u) => AppResult::Success(u),
                Err(e) => AppResult::Failure(AppError::from_failure(e.into())),
            },
            AppResult::Failure(e) => AppResult::Failure(e),
        }
    }

    /// Chain another result-producing operation off the success value.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> AppResult<U>) -> AppResult<U> {
        match self {
            AppResult::Success(v) => f(v),
            AppResult::Failure(e) => AppResult::Failure(e),
        }
    }

    /// Replace a failure with a fallback value. A success passes through.
    pub fn recover(self, f: impl FnOnce(AppError) -> T) -> AppResult<T> {
        match self {
            AppResult::Success(v) => AppResult::Success(v),
            AppResult::Failure(e) => AppResult::Success(f(e)),
        }
    }

    /// Replace a failure with another result. A success passes through.
    pub fn recover_with(self, f: impl FnOnce(AppError) -> AppResult<T>) -> AppResult<T> {
        match self {
            AppResult::Success(v) => AppResult::Success(v),
            AppResult::Failure(e) => f(e),
        }
    }

    /// Replace a failure with a fallible fallback. The fallback's error
    /// degrades to a failure via the standard converter.
    pub fn try_recover<E>(self, f: impl FnOnce(AppError) -> Result<T, E>) -> AppResult<T>
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        match self {
            AppResult::Success(v) => AppResult::Success(v),
            AppResult::Failure(e) => match f(e) {
                Ok(v) => AppResult::Success(v),
                Err(e) => AppResult::Failure(AppError::from_failure(e.into())),
            },
        }
    }

    /// Collapse both arms into one value. Exactly one branch runs.
    pub fn fold<R>(
        self,
        on_success: impl FnOnce(T) -> R,
        on_failure: impl FnOnce(AppError) -> R,
    ) -> R {
        match self {
            AppResult::Success(v) => on_success(v),
            AppResult::Failure(e) => on_failure(e),
        }
    }

    /// Run a side-effect hook on success. Hook failures are logged and
    /// swallowed; the result is returned unchanged either way.
    pub fn on_success(self, f: impl FnOnce(&T) -> Result<(), AppError>) -> Self {
        if let AppResult::Success(ref v) = self {
            if let Err(e) = f(v) {
                warn!("on_success hook failed: {} ({})", e.message(), e.code());
            }
        }
        self
    }

    /// Run a side-effect hook on failure. Hook failures are logged and
    /// swallowed; the result is returned unchanged either way.
    pub fn on_failure(self, f: impl FnOnce(&AppError) -> Result<(), AppError>) -> Self {
        if let AppResult::Failure(ref err) = self {
            if let Err(e) = f(err) {
                warn!("on_failure hook failed: {} ({})", e.message(), e.code());
            }
        }
        self
    }

    /// Collect a sequence of results into a result of a list, short-circuiting
    /// on the first failure in iteration order.
    pub fn sequence(results: impl IntoIterator<Item = AppResult<T>>) -> AppResult<Vec<T>> {
        let iter = results.into_iter();
        let mut collected = Vec::with_capacity(iter.size_hint().0);
        for result in iter {
            match result {
                AppResult::Success(v) => collected.push(v),
                AppResult::Failure(e) => return AppResult::Failure(e),
            }
        }
        AppResult::Success(collected)
    }

    /// View as a standard `Result`.
    pub fn into_result(self) -> Result<T, AppError> {
        match self {
            AppResult::Success(v) => Ok(v),
            AppResult::Failure(e) => Err(e),
        }
    }
}

/// Combine two results; the first failure in argument order wins.
pub fn combine<A, B, R>(
    a: AppResult<A>,
    b: AppResult<B>,
    f: impl FnOnce(A, B) -> R,
) -> AppResult<R> {
    match (a, b) {
        (AppResult::Success(a), AppResult::Success(b)) => AppResult::Success(f(a, b)),
        (AppResult::Failure(e), _) => AppResult::Failure(e),
        (_, AppResult::Failure(e)) => AppResult::Failure(e),
    }
}

/// Combine three results; the first failure in argument order wins.
pub fn combine3<A, B, C, R>(
    a: AppResult<A>,
    b: AppResult<B>,
    c: AppResult<C>,
    f: impl FnOnce(A, B, C) -> R,
) -> AppResult<R> {
    match (a, b, c) {
        (AppResult::Success(a), AppResult::Success(b), AppResult::Success(c)) => {
            AppResult::Success(f(a, b, c))
        }
        (AppResult::Failure(e), _, _) => AppResult::Failure(e),
        (_, AppResult::Failure(e), _) => AppResult::Failure(e),
        (_, _, AppResult::Failure(e)) => AppResult::Failure(e),
    }
}

impl<T, E: Into<AppError>> From<Result<T, E>> for AppResult<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => AppResult::Success(v),
            Err(e) => AppResult::Failure(e.into()),
        }
    }
}
