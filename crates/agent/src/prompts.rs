//! Prompt builders. Each prompt pins the exact YAML shape the generator
//! validates against and asks for a single fenced block.

use cloudplan_core::domain::resource::ServiceKind;
use cloudplan_render::diagram::SUPPORTED_SERVICES;

const RESOURCES_EXAMPLE: &str = r#"resources:
  - service: ec2
    type: web_server
    specs:
      instance_type: t3.medium
    region: us-east-1
    quantity: 2
    usage_hours: 730
  - service: rds
    type: database
    specs:
      instance_type: db.t3.large
      engine: mysql
      storage_gb: 100
    region: us-east-1"#;

const DIAGRAM_EXAMPLE: &str = r#"name: Web Application
direction: TB
clusters:
  - name: Web Tier
    nodes:
      - name: web_server_1
        service: ec2
        label: Web Server
  - name: Data Tier
    nodes:
      - name: database_1
        service: rds
        label: MySQL
connections:
  - from: web_server_1
    to: database_1
    label: DB Connection"#;

const SOW_EXAMPLE: &str = r#"project_name: Cloud Migration
client_name: Example Corp
project_description: Migrate the customer portal to AWS.
scope:
  - Provision networking and compute
  - Migrate the production database
deliverables:
  - Infrastructure as code repository
  - Runbook for operations
timeline:
  - phase: Discovery
    duration: 2 weeks
  - phase: Migration
    duration: 6 weeks
cost:
  total: 48000
  schedule:
    - milestone: Kickoff
      amount: 12000
    - milestone: Go-live
      amount: 36000
assumptions:
  - Client provides AWS account access"#;

pub fn resources_prompt(description: &str) -> String {
    format!(
        "Translate the architecture description below into an AWS resource inventory.\n\
         Use only these services: {services}.\n\
         Every entry needs `service`, `type` and `specs`; `region`, `quantity` and \
         `usage_hours` are optional. Do not include prices.\n\n\
         Example:\n```yaml\n{RESOURCES_EXAMPLE}\n```\n\n\
         Description:\n{description}\n\n\
         Reply with one ```yaml block and nothing else.",
        services = ServiceKind::supported_names().replace('|', ", "),
    )
}

pub fn diagram_prompt(description: &str) -> String {
    format!(
        "Translate the architecture description below into a diagram config.\n\
         Node names must be unique snake_case identifiers and every connection must \
         reference declared nodes. Allowed services: {services}. Direction is one of \
         TB, LR, RL, BT.\n\n\
         Example:\n```yaml\n{DIAGRAM_EXAMPLE}\n```\n\n\
         Description:\n{description}\n\n\
         Reply with one ```yaml block and nothing else.",
        services = SUPPORTED_SERVICES.join(", "),
    )
}

pub fn sow_prompt(description: &str) -> String {
    format!(
        "Draft a statement of work config for the project described below.\n\
         Include at least one scope item, deliverable and timeline phase. Amounts are \
         plain numbers without currency symbols.\n\n\
         Example:\n```yaml\n{SOW_EXAMPLE}\n```\n\n\
         Description:\n{description}\n\n\
         Reply with one ```yaml block and nothing else."
    )
}
