//! Test doubles shared by the orchestrator tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use forgeloop_core::{
    Answer, ConfirmationOutcome, ConfirmationPrompt, InteractionChannel, Question,
};

/// Replays queued decisions; `hang` makes every prompt wait forever.
#[derive(Default)]
pub struct ScriptedChannel {
    confirmations: Mutex<VecDeque<ConfirmationOutcome>>,
    answers: Mutex<VecDeque<Answer>>,
    prompts: Mutex<Vec<ConfirmationPrompt>>,
    questions: Mutex<Vec<Question>>,
    hang: bool,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm(self, outcome: ConfirmationOutcome) -> Self {
        self.confirmations.lock().unwrap().push_back(outcome);
        self
    }

    pub fn answer(self, answer: Answer) -> Self {
        self.answers.lock().unwrap().push_back(answer);
        self
    }

    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn prompts(&self) -> Vec<ConfirmationPrompt> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn questions(&self) -> Vec<Question> {
        self.questions.lock().unwrap().clone()
    }
}

#[async_trait]
impl InteractionChannel for ScriptedChannel {
    async fn request_confirmation(&self, prompt: &ConfirmationPrompt) -> ConfirmationOutcome {
        self.prompts.lock().unwrap().push(prompt.clone());
        if self.hang {
            std::future::pending::<()>().await;
        }
        let next = self.confirmations.lock().unwrap().pop_front();
        next.unwrap_or(ConfirmationOutcome::Denied)
    }

    async fn deliver_answer(&self, question: &Question) -> Answer {
        self.questions.lock().unwrap().push(question.clone());
        if self.hang {
            std::future::pending::<()>().await;
        }
        let next = self.answers.lock().unwrap().pop_front();
        next.unwrap_or(Answer::Cancelled)
    }
}
