//! Request context for attributing writes to a user.
//!
//! The [`Ctx`] struct carries request-scoped identity through BMC calls so
//! that columns like `disposition_user_id`, `owner_id`, and
//! `removal_user_id` can be stamped without threading a raw id everywhere.

/// Context carrying the acting user's id.
///
/// Passed to every BMC method. Currently used only for audit columns;
/// worker-driven background operations use [`Ctx::root_ctx`].
///
/// # Examples
///
/// ```
/// use alert_core::ctx::Ctx;
///
/// let ctx = Ctx::root_ctx();
/// assert_eq!(ctx.user_id(), 0);
///
/// let user_ctx = Ctx::new(42);
/// assert_eq!(user_ctx.user_id(), 42);
/// ```
#[derive(Clone, Debug)]
pub struct Ctx {
    user_id: i64,
}

impl Ctx {
    /// Creates a root context for system-level operations: ingestion,
    /// background workers, migrations.
    ///
    /// ```
    /// use alert_core::ctx::Ctx;
    ///
    /// let ctx = Ctx::root_ctx();
    /// assert_eq!(ctx.user_id(), 0);
    /// ```
    pub fn root_ctx() -> Self {
        Ctx { user_id: 0 }
    }

    /// Creates a context for a specific user.
    ///
    /// ```
    /// use alert_core::ctx::Ctx;
    ///
    /// let ctx = Ctx::new(123);
    /// assert_eq!(ctx.user_id(), 123);
    /// ```
    pub fn new(user_id: i64) -> Self {
        Ctx { user_id }
    }

    /// The acting user's database id, or 0 for root context.
    pub fn user_id(&self) -> i64 {
        self.user_id
    }
}
