//! A cursor over one JSON object that remembers which keys were read, so the
//! caller can reject everything else once it is done.

use serde_json::{Map, Value};

use crate::error::ValidationError;

pub(crate) fn child(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

pub(crate) fn index(path: &str, i: usize) -> String {
    format!("{path}[{i}]")
}

pub(crate) fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub(crate) fn expect_object<'a>(
    v: &'a Value,
    path: &str,
) -> Result<&'a Map<String, Value>, ValidationError> {
    v.as_object().ok_or_else(|| {
        ValidationError::new(path, format!("expected an object, found {}", kind_of(v)))
    })
}

pub(crate) fn expect_str(v: &Value, path: &str) -> Result<String, ValidationError> {
    match v {
        Value::String(s) => Ok(s.clone()),
        other => Err(ValidationError::new(
            path,
            format!("expected a string, found {}", kind_of(other)),
        )),
    }
}

pub(crate) fn expect_array<'a>(v: &'a Value, path: &str) -> Result<&'a [Value], ValidationError> {
    match v {
        Value::Array(items) => Ok(items),
        other => Err(ValidationError::new(
            path,
            format!("expected an array, found {}", kind_of(other)),
        )),
    }
}

pub(crate) struct Fields<'a> {
    map: &'a Map<String, Value>,
    path: String,
    seen: Vec<&'static str>,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(v: &'a Value, path: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            map: expect_object(v, path)?,
            path: path.to_string(),
            seen: Vec::new(),
        })
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn at(&self, key: &str) -> String {
        child(&self.path, key)
    }

    /// Present and non-null.
    pub(crate) fn get(&mut self, key: &'static str) -> Option<&'a Value> {
        self.seen.push(key);
        self.map.get(key).filter(|v| !v.is_null())
    }

    pub(crate) fn required(&mut self, key: &'static str) -> Result<&'a Value, ValidationError> {
        self.get(key)
            .ok_or_else(|| ValidationError::new(self.at(key), "missing required field"))
    }

    pub(crate) fn required_str(&mut self, key: &'static str) -> Result<String, ValidationError> {
        let v = self.required(key)?;
        expect_str(v, &self.at(key))
    }

    pub(crate) fn optional_str(&mut self, key: &'static str) -> Result<Option<String>, ValidationError> {
        match self.get(key) {
            Some(v) => expect_str(v, &self.at(key)).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn optional_bool(&mut self, key: &'static str) -> Result<Option<bool>, ValidationError> {
        match self.get(key) {
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(ValidationError::new(
                self.at(key),
                format!("expected a boolean, found {}", kind_of(other)),
            )),
            None => Ok(None),
        }
    }

    /// Missing or null lists read as empty.
    pub(crate) fn list<T>(
        &mut self,
        key: &'static str,
        mut item: impl FnMut(&'a Value, &str) -> Result<T, ValidationError>,
    ) -> Result<Vec<T>, ValidationError> {
        let Some(v) = self.get(key) else {
            return Ok(Vec::new());
        };
        let path = self.at(key);
        expect_array(v, &path)?
            .iter()
            .enumerate()
            .map(|(i, x)| item(x, &index(&path, i)))
            .collect()
    }

    /// Rejects every key that was never asked for.
    pub(crate) fn finish(self) -> Result<(), ValidationError> {
        for key in self.map.keys() {
            if !self.seen.contains(&key.as_str()) {
                return Err(ValidationError::new(
                    child(&self.path, key),
                    "unknown field",
                ));
            }
        }
        Ok(())
    }
}
