//! Server-side lists sharing one method shape
//!
//! The allowlist, bans, IP bans and operators each expose
//! `<base>`, `<base>/set`, `<base>/add`, `<base>/remove` and `<base>/clear`.
//! Every mutating method answers with the list as it now stands.

use msmp_client::{MsmpClient, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;

/// Wrap one argument as a positional parameter list
pub(crate) fn positional<A>(arg: &A) -> Result<Value>
where
    A: Serialize + ?Sized,
{
    Ok(Value::Array(vec![serde_json::to_value(arg)?]))
}

/// Typed handle to one server-side list of `T`
pub struct ListEndpoint<'a, T> {
    client: &'a MsmpClient,
    base: &'static str,
    _item: PhantomData<T>,
}

impl<'a, T> ListEndpoint<'a, T>
where
    T: Serialize + DeserializeOwned,
{
    pub(crate) fn new(client: &'a MsmpClient, base: &'static str) -> Self {
        Self {
            client,
            base,
            _item: PhantomData,
        }
    }

    /// Method name of the read call, e.g. `minecraft:allowlist`
    pub fn method(&self) -> &'static str {
        self.base
    }

    pub async fn get(&self) -> Result<Vec<T>> {
        self.client.request(self.base, &Value::Null).await
    }

    /// Replace the whole list
    pub async fn set(&self, items: &[T]) -> Result<Vec<T>> {
        self.client
            .request(&format!("{}/set", self.base), &positional(items)?)
            .await
    }

    pub async fn add(&self, item: &T) -> Result<Vec<T>> {
        self.client
            .request(&format!("{}/add", self.base), &positional(item)?)
            .await
    }

    /// Remove the entry matching `key`. The key shape depends on the list:
    /// a [`Player`](super::Player) for player lists, an
    /// [`IpAddress`](super::IpAddress) for IP bans.
    pub async fn remove<K>(&self, key: &K) -> Result<Vec<T>>
    where
        K: Serialize + ?Sized,
    {
        self.client
            .request(&format!("{}/remove", self.base), &positional(key)?)
            .await
    }

    pub async fn clear(&self) -> Result<Vec<T>> {
        self.client
            .request(&format!("{}/clear", self.base), &Value::Null)
            .await
    }
}
