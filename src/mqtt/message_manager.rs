use chrono::NaiveDateTime;

/// Outbound message handed to the broker client.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MQTTMessage {
    topic: String,
    content: String,
    timestamp: NaiveDateTime,
}

impl MQTTMessage {
    pub fn from_topic(topic: String, content: String) -> Self {
        MQTTMessage {
            topic,
            content,
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_parts(self) -> (String, String) {
        (self.topic, self.content)
    }

    pub fn render(&self) -> String {
        format!("{}: {}\n{}", self.timestamp, self.topic, self.content)
    }
}
