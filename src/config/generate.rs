/// Commented starter configuration, written as `default.yml`.
pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# LOGRELAY CONFIGURATION
# =============================================================================
# Every *.json, *.yaml and *.yml file in the configuration directory is loaded
# in filename order. Each file names one backend and any number of sources.
#
# Configuration directory (in order of precedence):
#   1. Path specified via --config-dir
#   2. ~/.config/logrelay.d
#   3. /etc/logrelay.d
#
# This file (default.yml) additionally holds the agent-wide settings below.

# =============================================================================
# AGENT SETTINGS (default file only)
# =============================================================================

# Follow the systemd journal: true/false or on/yes/true/1
JOURNALCTL: false

# Static labels attached to every journal entry
JOURNALCTL_LABELS:
  host: my-server

# Seconds between config re-scans for new files and glob matches (0 disables)
AUTO_RELOAD_INTERVAL: 0

# Intake queue ceiling. When set, overflow drains to disk buffers;
# when unset, overflow above 5000 entries is discarded.
# QUEUE_SIZE_LIMIT: 10000

# Root directory for disk buffers
BUFFER_DIR: /var/lib/logrelay/buffer

# Buffered records older than this are deleted
WAL_RETENTION: 24h

# How often buffered records are retried (0s disables periodic retry)
REPLAY_INTERVAL: 30s

# =============================================================================
# BACKEND
# =============================================================================
# One <BACKEND>_IP key per file: loki, elasticsearch, opensearch, graylog,
# victorialogs, fluentbit or clickhouse. A list means replicas; an entry counts
# as delivered when any replica accepts it. Without a key, loki on
# localhost:3100 is used.

LOKI_IP: localhost:3100

# Optional backend settings
SINK_OPTIONS:
  timeout: 5s
  # index_prefix: logrelay      # elasticsearch / opensearch
  # username: elastic           # elasticsearch / opensearch / clickhouse
  # password: changeme
  # tag: logrelay               # fluentbit
  # database: logs              # clickhouse
  # table: logrelay_logs        # clickhouse
  # hostname: my-server         # graylog

# =============================================================================
# SOURCES
# =============================================================================
# <name>:
#   <subname>:
#     path_file: file path or glob (*, ?, [...], **)
#     delimiter: trailing characters stripped from each line (default newline)
#     labels: static labels
#     rate_limit: max entries per second
#     buffer_size: entries per delivery batch
#     disk_buffer: keep undeliverable entries on disk for retry

syslog:
  MAIN:
    path_file: /var/log/syslog
    labels:
      env: production

nginx:
  ACCESS:
    path_file: /var/log/nginx/*access.log
    rate_limit: 200
    buffer_size: 50
    disk_buffer: true
"#
    .to_string()
}
