//! Rewrite passes applied to browse queries before they are built
//!
//! Each pass returns `Some(rewritten)` when it changed the parameters and
//! `None` when it did not apply. A reference that cannot be resolved is kept
//! as `Unresolved`, which the query builder turns into an empty result.

use strum::{Display, EnumIter};
use tracing::debug;

use crate::error::ItemResult;
use crate::query::{CategoryRef, ItemQueryParams, UserRef};
use crate::repository::{CategoryRepository, UserRepository};

/// Browse rewrite passes, in application order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum RewritePass {
    User,
    DateRange,
    Category,
}

/// Resolve a `user` email to the user's id
pub async fn rewrite_user<U>(users: &U, params: &ItemQueryParams) -> ItemResult<Option<ItemQueryParams>>
where
    U: UserRepository + ?Sized,
{
    let Some(UserRef::Email(email)) = &params.user else {
        return Ok(None);
    };

    let resolved = match users.find_by_email(email).await? {
        Some(user) => UserRef::Id(user.id),
        None => {
            debug!(%email, "No user with this email, browse will be empty");
            UserRef::Unresolved
        }
    };

    Ok(Some(ItemQueryParams {
        user: Some(resolved),
        ..params.clone()
    }))
}

/// Turn a calendar `date_range` into a creation-time window
pub fn rewrite_date_range(params: &ItemQueryParams) -> Option<ItemQueryParams> {
    let range = params.date_range?;
    Some(ItemQueryParams {
        date_range: None,
        created: Some(range.window()),
        ..params.clone()
    })
}

/// Resolve a `category` name to the category's id
pub async fn rewrite_category<C>(
    categories: &C,
    params: &ItemQueryParams,
) -> ItemResult<Option<ItemQueryParams>>
where
    C: CategoryRepository + ?Sized,
{
    let Some(CategoryRef::Name(name)) = &params.category else {
        return Ok(None);
    };

    let resolved = match categories.find_by_name(name).await? {
        Some(category) => CategoryRef::Id(category.id),
        None => {
            debug!(%name, "No category with this name, browse will be empty");
            CategoryRef::Unresolved
        }
    };

    Ok(Some(ItemQueryParams {
        category: Some(resolved),
        ..params.clone()
    }))
}

/// Run every pass in order
pub async fn apply_rewrites<U, C>(
    users: &U,
    categories: &C,
    mut params: ItemQueryParams,
) -> ItemResult<ItemQueryParams>
where
    U: UserRepository + ?Sized,
    C: CategoryRepository + ?Sized,
{
    use strum::IntoEnumIterator;

    for pass in RewritePass::iter() {
        let rewritten = match pass {
            RewritePass::User => rewrite_user(users, &params).await?,
            RewritePass::DateRange => rewrite_date_range(&params),
            RewritePass::Category => rewrite_category(categories, &params).await?,
        };
        if let Some(rewritten) = rewritten {
            debug!(%pass, "Query rewritten");
            params = rewritten;
        }
    }

    Ok(params)
}
