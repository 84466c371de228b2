//! Static prompt templates

use svcmgr_core::ServiceType;

const SYSTEMD_HELP: &str = "# systemd Service Management

systemd is the modern init system used by most Linux distributions. Key commands:
- `systemctl start <service>` - Start a service
- `systemctl stop <service>` - Stop a service
- `systemctl restart <service>` - Restart a service
- `systemctl enable <service>` - Enable service at boot
- `systemctl disable <service>` - Disable service at boot
- `systemctl status <service>` - Check service status
- `systemctl list-units --type=service` - List all services";

const SYSV_HELP: &str = "# System V init Service Management

Traditional init system using scripts in /etc/init.d/. Key commands:
- `/etc/init.d/<service> start` - Start a service
- `/etc/init.d/<service> stop` - Stop a service
- `/etc/init.d/<service> restart` - Restart a service
- `chkconfig <service> on` (RHEL/CentOS) or `update-rc.d <service> enable` (Debian/Ubuntu) - Enable at boot
- Service scripts are located in /etc/init.d/";

const DOCKER_HELP: &str = "# Docker Container Management

Manage Docker containers as services. Key commands:
- `docker start <container>` - Start a container
- `docker stop <container>` - Stop a container
- `docker restart <container>` - Restart a container
- `docker update --restart=always <container>` - Auto-restart container
- `docker ps -a` - List all containers
- `docker logs <container>` - View container logs";

const OVERVIEW_HELP: &str = "# Linux Service Management Guide

This MCP server supports managing services through multiple methods:

## Supported Service Types
1. **systemd** - Modern Linux distributions
2. **System V init** - Traditional Linux distributions
3. **Docker** - Container management

## Available Operations
- Start/Stop/Restart services
- Enable/Disable services for boot
- Get service status and information
- List all available services
- View Docker container logs

## Usage
Use the available tools to manage services. The server will automatically detect which service manager to use based on your system and the service name.";

const TROUBLESHOOTING_STEPS: &str = "## Troubleshooting Steps

1. **Check Service Status**
   - Use get_service_status tool to check current status
   - Look for error messages and status information

2. **View Service Logs**
   - For systemd: journalctl -u <service_name> -f
   - For Docker: Use get_docker_logs tool
   - For SysV: Check /var/log/ for service-specific logs

3. **Common Issues**
   - Service not starting: Check configuration files
   - Permission issues: Verify user/group permissions
   - Port conflicts: Check if required ports are available
   - Dependencies: Ensure required services are running

4. **Configuration Check**
   - Verify service configuration files
   - Check for syntax errors
   - Ensure required directories exist

5. **Resource Issues**
   - Check system resources (CPU, memory, disk)
   - Verify required files and dependencies exist

## Next Steps
Use the available tools to gather more information about the service status and logs.";

pub const HELP_DESCRIPTION: &str = "Service management help and guidance";

/// Help text for a topic. Unknown or missing topics get the overview.
pub fn management_help(topic: Option<&str>) -> &'static str {
    match topic.and_then(|t| t.parse::<ServiceType>().ok()) {
        Some(ServiceType::Systemd) => SYSTEMD_HELP,
        Some(ServiceType::Sysv) => SYSV_HELP,
        Some(ServiceType::Docker) => DOCKER_HELP,
        None => OVERVIEW_HELP,
    }
}

pub fn troubleshooting_description(service_name: &str) -> String {
    format!("Troubleshooting guidance for service: {}", service_name)
}

pub fn troubleshooting(service_name: &str, error_description: Option<&str>) -> String {
    let mut text = format!("# Troubleshooting Service: {}\n\n", service_name);
    if let Some(issue) = error_description.filter(|d| !d.is_empty()) {
        text.push_str(&format!("## Reported Issue\n{}\n\n", issue));
    }
    text.push_str(TROUBLESHOOTING_STEPS);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_topics() {
        assert!(management_help(Some("systemd")).starts_with("# systemd Service Management"));
        assert!(management_help(Some("sysv")).contains("/etc/init.d/"));
        assert!(management_help(Some("docker")).starts_with("# Docker Container Management"));
        assert!(management_help(Some("troubleshooting")).starts_with("# Linux Service Management Guide"));
        assert_eq!(management_help(None), OVERVIEW_HELP);
    }

    #[test]
    fn test_troubleshooting_with_issue() {
        let text = troubleshooting("nginx", Some("port 80 in use"));
        assert!(text.starts_with("# Troubleshooting Service: nginx\n\n## Reported Issue\nport 80 in use\n\n"));
        assert!(text.ends_with("status and logs."));
    }

    #[test]
    fn test_troubleshooting_without_issue() {
        let text = troubleshooting("nginx", Some(""));
        assert!(text.starts_with("# Troubleshooting Service: nginx\n\n## Troubleshooting Steps"));
    }
}
