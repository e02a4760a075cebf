//! MQTT topic definitions

/// MQTT topic patterns
pub struct Topics;

impl Topics {
    /// Update command topic for one device
    pub fn device_update(device_id: &str) -> String {
        format!("otafleet/device/{}/update", device_id)
    }

    /// Cancel command topic for one device
    pub fn device_cancel(device_id: &str) -> String {
        format!("otafleet/device/{}/cancel", device_id)
    }

    /// Per-job status topic a device publishes to
    pub fn device_job_status(device_id: &str, job_id: &str) -> String {
        format!("otafleet/device/{}/jobs/{}/status", device_id, job_id)
    }

    /// Wildcard subscription covering every device's job status topic
    pub fn status_subscription() -> &'static str {
        "otafleet/device/+/jobs/+/status"
    }

    /// Parse a status topic into (device_id, job_id)
    pub fn parse_status_topic(topic: &str) -> Option<(String, String)> {
        let parts: Vec<&str> = topic.split('/').collect();
        if parts.len() == 6
            && parts[0] == "otafleet"
            && parts[1] == "device"
            && parts[3] == "jobs"
            && parts[5] == "status"
            && !parts[2].is_empty()
            && !parts[4].is_empty()
        {
            Some((parts[2].to_string(), parts[4].to_string()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_generation() {
        assert_eq!(
            Topics::device_update("device-123"),
            "otafleet/device/device-123/update"
        );
        assert_eq!(
            Topics::device_job_status("device-123", "ota-sensor-1.0.0-ab12cd34"),
            "otafleet/device/device-123/jobs/ota-sensor-1.0.0-ab12cd34/status"
        );
    }

    #[test]
    fn test_status_topic_parsing() {
        assert_eq!(
            Topics::parse_status_topic("otafleet/device/device-123/jobs/job-9/status"),
            Some(("device-123".to_string(), "job-9".to_string()))
        );
        assert_eq!(
            Topics::parse_status_topic("otafleet/device/device-123/update"),
            None
        );
        assert_eq!(
            Topics::parse_status_topic("otafleet/device//jobs/job-9/status"),
            None
        );
    }
}
