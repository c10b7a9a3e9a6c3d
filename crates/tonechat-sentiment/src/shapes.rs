use serde_json::Value;

use tonechat_types::models::{Sentiment, SentimentLabel};

/// The response layouts the scoring service is known to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `{"data": ["LABEL_2", 0.87, ...]}`
    DataVector,
    /// `{"data": [["LABEL_2", 0.87], ...]}`, first inner array only
    DataNested,
    /// `{"data": {"label": "pos", "score": 0.87}}`, either key optional
    DataObject,
    /// `["LABEL_2", 0.87]`
    BareVector,
}

impl ResponseShape {
    /// Priority order in which shapes are tried.
    pub const ALL: [ResponseShape; 4] = [
        ResponseShape::DataVector,
        ResponseShape::DataNested,
        ResponseShape::DataObject,
        ResponseShape::BareVector,
    ];

    pub fn parse(self, body: &Value) -> Option<Sentiment> {
        match self {
            Self::DataVector => {
                let data = body.get("data")?.as_array()?;
                if data.first()?.is_array() {
                    return None;
                }
                read_vector(data)
            }
            Self::DataNested => {
                let data = body.get("data")?.as_array()?;
                read_vector(data.first()?.as_array()?)
            }
            Self::DataObject => read_object(body.get("data")?.as_object()?),
            Self::BareVector => read_vector(body.as_array()?),
        }
    }
}

/// Read a classifier response body, trying every known shape in order.
pub fn parse_response(body: &Value) -> Option<(ResponseShape, Sentiment)> {
    ResponseShape::ALL
        .into_iter()
        .find_map(|shape| shape.parse(body).map(|sentiment| (shape, sentiment)))
}

fn read_vector(vec: &[Value]) -> Option<Sentiment> {
    if vec.len() < 2 {
        return None;
    }
    Some(Sentiment {
        label: read_label(&vec[0])?,
        score: vec[1].as_f64().unwrap_or(0.0),
    })
}

fn read_object(obj: &serde_json::Map<String, Value>) -> Option<Sentiment> {
    let label = match obj.get("label") {
        Some(raw) => Some(read_label(raw)?),
        None => None,
    };
    let score = obj.get("score").and_then(Value::as_f64);

    if label.is_none() && score.is_none() {
        return None;
    }
    Some(Sentiment {
        label: label.unwrap_or(SentimentLabel::Neutral),
        score: score.unwrap_or(0.0),
    })
}

/// Labels must be strings; a JSON null reads as neutral.
fn read_label(raw: &Value) -> Option<SentimentLabel> {
    match raw {
        Value::String(s) => Some(SentimentLabel::normalize(s)),
        Value::Null => Some(SentimentLabel::Neutral),
        _ => None,
    }
}
