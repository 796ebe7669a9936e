//! Prediction requests against a deployed model
//!
//! The serving container accepts `POST {url}/predict` with a form field
//! `json` holding a tensor payload:
//!
//! ```json
//! {"data": {"names": ["f0", "f1"], "tensor": {"shape": [1, 2], "values": [0.5, 1.5]}}}
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Dense tensor with row-major values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl Tensor {
    /// Build a tensor, checking that `values` fills `shape` exactly
    pub fn new(shape: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(Error::InvalidTensor(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                values.len()
            )));
        }
        Ok(Self { shape, values })
    }

    /// Flatten a batch of equally sized rows into a `[rows, cols]` tensor
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut values = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(Error::InvalidTensor(format!(
                    "row {} has {} values, expected {}",
                    i,
                    row.len(),
                    cols
                )));
            }
            values.extend_from_slice(row);
        }
        Ok(Self {
            shape: vec![rows.len(), cols],
            values,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionData {
    pub names: Option<Vec<String>>,
    pub tensor: Tensor,
}

/// Body of a `/predict` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub data: PredictionData,
}

impl PredictionRequest {
    pub fn new(tensor: Tensor, names: Option<Vec<String>>) -> Self {
        Self {
            data: PredictionData { names, tensor },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Blocking client for a resolved prediction endpoint
pub struct PredictionClient {
    url: String,
    http: reqwest::blocking::Client,
}

impl PredictionClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn predict_url(&self) -> String {
        format!("{}/predict", self.url)
    }

    /// Send one tensor and return the parsed JSON response
    pub fn predict(&self, tensor: Tensor, names: Option<Vec<String>>) -> Result<serde_json::Value> {
        let payload = PredictionRequest::new(tensor, names).to_json()?;
        let url = self.predict_url();
        tracing::debug!(url = %url, bytes = payload.len(), "Sending prediction request");

        let response = self
            .http
            .post(&url)
            .form(&[("json", payload)])
            .send()?
            .error_for_status()?;

        Ok(response.json()?)
    }
}
