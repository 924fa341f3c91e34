use crate::models::PlaybookTemplate;

struct DefaultPlaybook {
    name: &'static str,
    description: &'static str,
    content: &'static str,
}

const DEFAULT_PLAYBOOKS: &[DefaultPlaybook] = &[
    DefaultPlaybook {
        name: "Basic Server Setup",
        description: "Basic server configuration and package installation",
        content: r#"---
- name: Basic Server Setup
  hosts: all
  become: yes
  tasks:
    - name: Update package cache
      apt:
        update_cache: yes
      when: ansible_os_family == "Debian"

    - name: Install basic packages
      package:
        name:
          - curl
          - wget
          - vim
          - htop
        state: present

    - name: Create admin user
      user:
        name: "{{ admin_user | default('admin') }}"
        groups: sudo
        shell: /bin/bash
        create_home: yes
"#,
    },
    DefaultPlaybook {
        name: "Docker Installation",
        description: "Install Docker and Docker Compose",
        content: r#"---
- name: Install Docker
  hosts: all
  become: yes
  tasks:
    - name: Install required packages
      apt:
        name:
          - apt-transport-https
          - ca-certificates
          - curl
          - gnupg
          - lsb-release
        state: present
        update_cache: yes
      when: ansible_os_family == "Debian"

    - name: Add Docker GPG key
      apt_key:
        url: https://download.docker.com/linux/ubuntu/gpg
        state: present
      when: ansible_os_family == "Debian"

    - name: Add Docker repository
      apt_repository:
        repo: "deb [arch=amd64] https://download.docker.com/linux/ubuntu {{ ansible_distribution_release }} stable"
        state: present
      when: ansible_os_family == "Debian"

    - name: Install Docker
      apt:
        name:
          - docker-ce
          - docker-ce-cli
          - containerd.io
        state: present
        update_cache: yes
      when: ansible_os_family == "Debian"

    - name: Start and enable Docker
      systemd:
        name: docker
        state: started
        enabled: yes

    - name: Install Docker Compose
      pip:
        name: docker-compose
        state: present
"#,
    },
    DefaultPlaybook {
        name: "Security Hardening",
        description: "Basic security hardening for servers",
        content: r#"---
- name: Security Hardening
  hosts: all
  become: yes
  tasks:
    - name: Update all packages
      package:
        name: "*"
        state: latest

    - name: Install fail2ban
      package:
        name: fail2ban
        state: present

    - name: Configure SSH
      lineinfile:
        path: /etc/ssh/sshd_config
        regexp: "{{ item.regexp }}"
        line: "{{ item.line }}"
        backup: yes
      with_items:
        - { regexp: '^#?PermitRootLogin', line: 'PermitRootLogin no' }
        - { regexp: '^#?PasswordAuthentication', line: 'PasswordAuthentication no' }
        - { regexp: '^#?Port', line: 'Port {{ ssh_port | default(22) }}' }
      notify: restart ssh

    - name: Configure firewall
      ufw:
        rule: allow
        port: "{{ ssh_port | default(22) }}"
        proto: tcp

    - name: Enable firewall
      ufw:
        state: enabled
        policy: deny
        direction: incoming

  handlers:
    - name: restart ssh
      service:
        name: ssh
        state: restarted
"#,
    },
];

/// Starter playbooks offered to clients; they are never stored.
pub fn get_playbook_templates() -> Vec<PlaybookTemplate> {
    DEFAULT_PLAYBOOKS
        .iter()
        .map(|p| PlaybookTemplate {
            name: p.name.to_string(),
            description: p.description.to_string(),
            content: p.content.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_named_playbooks() {
        let templates = get_playbook_templates();
        let names: Vec<&str> = templates.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Basic Server Setup", "Docker Installation", "Security Hardening"]);
        for t in &templates {
            assert!(t.content.starts_with("---\n- name: "));
            assert!(!t.description.is_empty());
        }
    }
}
