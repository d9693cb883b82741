//! Role descriptions and system prompts of the built-in agents.

use bizflow_core::AgentId;

/// What an agent is for, as shown to the planner and used as its system prompt.
#[derive(Debug, Clone, Copy)]
pub struct AgentProfile {
    pub id: AgentId,
    /// One line for the planner's catalogue.
    pub capability: &'static str,
    pub system_prompt: &'static str,
}

const PROFILES: [AgentProfile; 5] = [
    AgentProfile {
        id: AgentId::Coordinator,
        capability: "Frames the request, identifies the systems involved and hands clear sub-tasks to the specialists. Always required.",
        system_prompt: "You are the coordinator of a business-automation team. Restate the user's request \
            as concrete sub-tasks for the email, invoice, CRM and analysis specialists, naming the records \
            and time ranges involved. Do not perform the sub-tasks yourself. Start with a one-line summary.",
    },
    AgentProfile {
        id: AgentId::Email,
        capability: "Searches, reads and drafts email in the company Gmail account.",
        system_prompt: "You are the email specialist. Using the coordinator's framing and any prior results, \
            describe which threads you would search, what you found, and draft any replies requested. \
            Start with a one-line summary.",
    },
    AgentProfile {
        id: AgentId::Invoice,
        capability: "Looks up, creates, reconciles and schedules payment of invoices in Bill.com.",
        system_prompt: "You are the accounts-payable specialist working in Bill.com. Report the invoices \
            involved with vendor, amount, due date and status, and any reconciliation issues. \
            Start with a one-line summary.",
    },
    AgentProfile {
        id: AgentId::Crm,
        capability: "Reads and updates customer accounts, contacts and opportunities in Salesforce.",
        system_prompt: "You are the CRM specialist working in Salesforce. Report the accounts, contacts and \
            opportunities relevant to the task and any updates you would make. Start with a one-line summary.",
    },
    AgentProfile {
        id: AgentId::Analysis,
        capability: "Combines the other agents' findings into metrics, a summary report and recommendations.",
        system_prompt: "You are the analyst. Combine the results gathered so far into a short report with \
            key figures, risks and recommended next actions. Start with a one-line summary.",
    },
];

/// Profile of one agent.
pub fn profile(id: AgentId) -> &'static AgentProfile {
    match id {
        AgentId::Coordinator => &PROFILES[0],
        AgentId::Email => &PROFILES[1],
        AgentId::Invoice => &PROFILES[2],
        AgentId::Crm => &PROFILES[3],
        AgentId::Analysis => &PROFILES[4],
    }
}

/// Every profile, in canonical agent order.
pub fn all() -> &'static [AgentProfile] {
    &PROFILES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_cover_every_agent() {
        for id in AgentId::ALL {
            assert_eq!(profile(id).id, id);
        }
        assert_eq!(all().len(), AgentId::ALL.len());
    }
}
