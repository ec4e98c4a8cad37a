//! Key layout for the Store's Fjall partitions.
//!
//! - `agents`: agent:{id} -> Agent (JSON)
//! - `jobs`: job:{id} -> Job (JSON)
//! - `idempotency`: idem:{repo}|{ref}|{host} -> job_id (string)
//! - `logs`: log:{job_id}:{sequence:016} -> LogChunk (JSON)
//! - `metadata`: meta:{key} -> value (string)

use crate::domain::IdempotencyKey;

pub fn encode_agent_key(id: &str) -> Vec<u8> {
    format!("agent:{id}").into_bytes()
}

pub fn encode_job_key(id: &str) -> Vec<u8> {
    format!("job:{id}").into_bytes()
}

pub fn encode_idem_key(key: &IdempotencyKey) -> Vec<u8> {
    format!("idem:{key}").into_bytes()
}

pub fn encode_log_key(job_id: &str, sequence: u64) -> Vec<u8> {
    format!("log:{job_id}:{sequence:016}").into_bytes()
}

pub fn encode_log_prefix(job_id: &str) -> Vec<u8> {
    format!("log:{job_id}:").into_bytes()
}

pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{key}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_key_roundtrip_shape() {
        assert_eq!(encode_job_key("abc"), b"job:abc");
    }

    #[test]
    fn log_key_is_sortable_within_job() {
        let a = encode_log_key("j1", 5);
        let b = encode_log_key("j1", 42);
        assert!(a < b);
    }

    #[test]
    fn idem_key_shape() {
        let key = IdempotencyKey {
            repo: "myorg/web".into(),
            git_ref: "refs/heads/main".into(),
            host: "web-01".into(),
        };
        assert_eq!(encode_idem_key(&key), b"idem:myorg/web|refs/heads/main|web-01");
    }
}
