//! Line console driving one session
//!
//! Stdin lines and session events are multiplexed on one task; the session
//! controller is only touched after `select!` has picked a winner.

use anyhow::anyhow;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use uuid::Uuid;

use poker_core::{SessionController, SessionEvent, SessionStore};
use poker_net::InviteUrl;

use crate::clipboard;
use crate::command::{self, Command, FinalEstimate};
use crate::render;

enum Wake {
    Line(Option<String>),
    Session(SessionEvent),
}

enum Flow {
    Continue,
    Quit,
}

pub struct Console {
    controller: SessionController<dyn SessionStore>,
    /// Link for remote games; local games only have a code
    invite: Option<InviteUrl>,
}

impl Console {
    pub fn new(controller: SessionController<dyn SessionStore>, invite: Option<InviteUrl>) -> Self {
        Self { controller, invite }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        if let Some(invite) = &self.invite {
            println!("Invite link: {}", invite);
        }
        println!("Type 'help' for commands.");
        self.show();

        loop {
            let wake = tokio::select! {
                line = lines.next_line() => Wake::Line(line?),
                event = self.controller.next_event() => Wake::Session(event),
            };

            match wake {
                Wake::Line(None) => break,
                Wake::Line(Some(line)) => match command::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(command)) => match self.execute(command).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Quit) => break,
                        Err(e) => println!("! {}", e),
                    },
                    Err(e) => println!("! {}", e),
                },
                Wake::Session(SessionEvent::Closed) => {
                    println!("Disconnected from the game.");
                    break;
                }
                Wake::Session(event) => self.on_event(event),
            }
        }

        self.controller.leave();
        info!("Console closed");
        Ok(())
    }

    fn on_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Updated => self.show(),
            SessionEvent::Countdown(secs) => {
                if let Some(line) = render::countdown_line(secs) {
                    println!("{}", line);
                }
            }
            SessionEvent::TimerExpired => println!("Time is up!"),
            SessionEvent::Celebrate(event) => {
                println!("{}", render::celebration(&event, self.controller.view()));
            }
            SessionEvent::SyncFailed(reason) => println!("! could not refresh: {}", reason),
            SessionEvent::Closed => {}
        }
    }

    fn show(&self) {
        if let Some(view) = self.controller.view() {
            println!();
            println!(
                "{}",
                render::render_game(view, self.controller.remaining_seconds())
            );
        }
    }

    async fn execute(&mut self, command: Command) -> anyhow::Result<Flow> {
        debug!(command = ?command, "Console command");
        match command {
            Command::Story { title, description } => {
                let story = self
                    .controller
                    .add_story(&title, description.as_deref())
                    .await?;
                println!("Added '{}'", story.title);
            }
            Command::Select(n) => {
                let story_id = self.story_at(n)?;
                self.controller.select_story(story_id).await?;
            }
            Command::Start(n) => {
                let story_id = match n {
                    Some(n) => self.story_at(n)?,
                    None => self.current_story()?,
                };
                self.controller.start_voting(story_id).await?;
            }
            Command::Vote(card) => {
                let voting = self.controller.view().is_some_and(|v| v.is_voting());
                if !voting {
                    return Err(anyhow!("voting is not open"));
                }
                self.controller.cast_vote(card).await?;
                println!("You voted {}", card);
            }
            Command::Reveal => self.controller.reveal_cards().await?,
            Command::Reset => self.controller.reset_voting().await?,
            Command::Finalize(estimate) => {
                let story_id = self.current_story()?;
                let estimate = match estimate {
                    FinalEstimate::Given(estimate) => Some(estimate),
                    FinalEstimate::Nothing => None,
                    FinalEstimate::Consensus => self
                        .controller
                        .view()
                        .and_then(|v| v.consensus())
                        .and_then(|c| c.value)
                        .map(Into::into),
                };
                self.controller.finalize_estimate(story_id, estimate).await?;
            }
            Command::TimerOn(secs) => self.controller.set_timer(true, secs).await?,
            Command::TimerOff => self.controller.set_timer(false, None).await?,
            Command::TimerStart => self.controller.start_timer().await?,
            Command::Show => self.show(),
            Command::Link => self.copy_link(),
            Command::Help => println!("{}", render::HELP),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn story_at(&self, n: usize) -> anyhow::Result<Uuid> {
        self.controller
            .view()
            .and_then(|v| n.checked_sub(1).and_then(|i| v.game().stories.get(i)))
            .map(|s| s.id)
            .ok_or_else(|| anyhow!("there is no story {}", n))
    }

    fn current_story(&self) -> anyhow::Result<Uuid> {
        self.controller
            .view()
            .and_then(|v| v.game().current_story_id)
            .ok_or_else(|| anyhow!("no story is selected"))
    }

    fn copy_link(&self) {
        let text = match (&self.invite, self.controller.view()) {
            (Some(invite), _) => invite.to_url(),
            (None, Some(view)) => view.game().invite_code.to_string(),
            (None, None) => return,
        };
        match clipboard::copy(&text) {
            Some(_) => println!("Copied {}", text),
            None => println!("Clipboard unavailable, share this: {}", text),
        }
    }
}
