use std::ops::{Deref, DerefMut};

use super::Connection;

/// Suspends a connection's auto-reconnect for as long as the guard lives.
///
/// An implicit reconnect in the middle of a transaction silently discards it, and any
/// statements issued afterwards would run outside of it. The flag is restored to its
/// original value when the guard drops, on every exit path.
pub struct ReconnectGuard<'c, C: Connection + ?Sized> {
    conn: &'c mut C,
    original: bool,
}

impl<'c, C: Connection + ?Sized> ReconnectGuard<'c, C> {
    pub fn new(conn: &'c mut C) -> Self {
        let original = conn.auto_reconnect();
        conn.set_auto_reconnect(false);
        Self { conn, original }
    }

    /// The flag's value before the guard was taken.
    #[must_use]
    pub fn original(&self) -> bool {
        self.original
    }
}

impl<C: Connection + ?Sized> Deref for ReconnectGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn
    }
}

impl<C: Connection + ?Sized> DerefMut for ReconnectGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn
    }
}

impl<C: Connection + ?Sized> Drop for ReconnectGuard<'_, C> {
    fn drop(&mut self) {
        self.conn.set_auto_reconnect(self.original);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::results::ResultSet;
    use crate::statement::Statement;

    struct FlagOnly {
        auto_reconnect: bool,
    }

    impl Connection for FlagOnly {
        fn execute(&mut self, _statement: &Statement) -> Result<ResultSet, DbError> {
            Ok(ResultSet::default())
        }
        fn set_autocommit(&mut self, _enabled: bool) -> Result<(), DbError> {
            Ok(())
        }
        fn commit(&mut self) -> Result<(), DbError> {
            Ok(())
        }
        fn rollback(&mut self) -> Result<(), DbError> {
            Ok(())
        }
        fn ping(&mut self) -> Result<(), DbError> {
            Ok(())
        }
        fn auto_reconnect(&self) -> bool {
            self.auto_reconnect
        }
        fn set_auto_reconnect(&mut self, enabled: bool) {
            self.auto_reconnect = enabled;
        }
    }

    #[test]
    fn disables_then_restores() {
        let mut conn = FlagOnly {
            auto_reconnect: true,
        };
        {
            let guard = ReconnectGuard::new(&mut conn);
            assert!(guard.original());
            assert!(!guard.auto_reconnect());
        }
        assert!(conn.auto_reconnect);
    }

    #[test]
    fn restores_original_even_if_changed_inside() {
        let mut conn = FlagOnly {
            auto_reconnect: false,
        };
        {
            let mut guard = ReconnectGuard::new(&mut conn);
            guard.set_auto_reconnect(true);
        }
        assert!(!conn.auto_reconnect);
    }

    #[test]
    fn restores_on_unwind() {
        let mut conn = FlagOnly {
            auto_reconnect: true,
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ReconnectGuard::new(&mut conn);
            panic!("statement blew up");
        }));
        assert!(result.is_err());
        assert!(conn.auto_reconnect);
    }
}
